//! # lightning-evm-bridge
//!
//! Swap coordinator ("LSP") bridging Lightning Network payments and
//! hashed-timelock contracts on an EVM chain.
//!
//! Clients swap in either direction over a WebSocket session:
//!
//! - **send** (EVM → Lightning): the client locks value in an HTLC payable
//!   to the bridge; the bridge pays the client's invoice and withdraws the
//!   HTLC with the preimage the payment revealed.
//! - **receive** (Lightning → EVM): the client pays a hold invoice; the
//!   bridge locks value on-chain under the same hashlock and settles the
//!   hold invoice once the client's withdrawal reveals the preimage.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── WS sessions (ws/)           ├── REST handlers (api/)
//!     │
//!     ├── SwapService (service/)
//!     │     ├── SolvencyMonitor
//!     │     └── CachedPaymentRecovery ──► EventBus (domain/)
//!     │
//!     ├── HtlcChain (chain/)      ── ethers, HashedTimelock contract
//!     ├── LightningNode (lightning/) ── LND REST
//!     └── Ledger (persistence/)   ── PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod lightning;
pub mod persistence;
pub mod service;
pub mod ws;
