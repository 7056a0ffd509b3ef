//! Service layer: the swap coordinators and their background jobs.
//!
//! [`SwapService`] owns the send-flow (EVM → Lightning), the receive-flow
//! (Lightning → EVM), relayed withdrawals and transaction-hash notices.
//! [`SolvencyMonitor`] reconciles Lightning balances after every on-chain
//! withdrawal, and [`CachedPaymentRecovery`] retries withdrawals whose
//! Lightning leg already succeeded.
//!
//! Coordinators never return errors to their caller; they report to the
//! session through [`Replies`] and checkpoint through the ledger.

pub mod receive_flow;
pub mod recovery;
pub mod relay;
pub mod reply;
pub mod request;
pub mod send_flow;
pub mod solvency;
pub mod swap_service;
pub mod validation;

use serde::Serialize;
use utoipa::ToSchema;

use crate::chain::ChainError;
use crate::lightning::LightningError;
use crate::persistence::LedgerError;

pub use recovery::{CachedPaymentRecovery, RecoveryReport};
pub use reply::{Replies, ReplyStatus, SwapReply};
pub use request::{InitiationReceive, InvoiceSend, RelayRequest, TxHashNotice};
pub use solvency::{HaltHook, SolvencyError, SolvencyMonitor};
pub use swap_service::{SwapService, SwapSettings};

/// Operating mode advertised to clients on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// A Lightning node is configured; swaps are executed for real.
    Active,
    /// No Lightning node is configured; sends are simulated.
    Mock,
}

/// Failure inside a coordinator, classified for the client reply.
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    /// The request failed validation; the message is safe to show.
    #[error("{0}")]
    Rejected(String),

    /// Ledger access failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// An on-chain call failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A Lightning call failed.
    #[error(transparent)]
    Lightning(#[from] LightningError),
}

impl SwapError {
    /// Shorthand for [`SwapError::Rejected`].
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}
