//! Domain layer: identifiers, swap records, balances, and shared state.
//!
//! Everything here is independent of the transport (WebSocket/HTTP) and of
//! the concrete ledgers (EVM, Lightning, PostgreSQL).

pub mod balance;
pub mod bridge_event;
pub mod event_bus;
pub mod ids;
pub mod pending_contracts;
pub mod transaction;

pub use balance::{ChannelBalance, ChannelBalanceSnapshot};
pub use bridge_event::BridgeEvent;
pub use event_bus::EventBus;
pub use ids::{ContractId, Hashlock, IdParseError, Preimage};
pub use pending_contracts::{ContractLease, PendingContracts};
pub use transaction::{
    CachedPayment, NewTransaction, Transaction, TransactionStatus, TransactionType,
};
