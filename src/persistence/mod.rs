//! Persistence layer: swap records, cached payments, balance snapshots.
//!
//! The [`Ledger`] trait is the narrow durable-storage surface the
//! coordinators depend on. [`postgres::PostgresLedger`] is the production
//! implementation; [`memory::MemoryLedger`] backs `PERSISTENCE_ENABLED=false`
//! deployments and the test suite.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::{
    CachedPayment, ChannelBalanceSnapshot, ContractId, NewTransaction, Transaction,
    TransactionStatus,
};

pub use memory::MemoryLedger;
pub use postgres::PostgresLedger;

/// Number of channel balance snapshots kept after each reconciliation.
pub const SNAPSHOT_RETENTION: usize = 2;

/// Errors raised by a [`Ledger`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A transaction for this contract id already exists.
    #[error("transaction already exists for contract {0}")]
    Duplicate(ContractId),

    /// A stored row could not be mapped into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The underlying database failed.
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Durable storage for swap state.
///
/// Status updates are compare-and-swap: a write only lands if the stored
/// status is one of the expected prior states, so two writers racing on
/// the same contract id cannot overwrite each other's terminal update.
#[async_trait]
pub trait Ledger: Send + Sync + std::fmt::Debug {
    /// Inserts a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Duplicate`] if `contract_id` is already
    /// recorded, or a database error.
    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, LedgerError>;

    /// Looks up the transaction for a contract id.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn find_transaction(
        &self,
        contract_id: &ContractId,
    ) -> Result<Option<Transaction>, LedgerError>;

    /// Moves the transaction to `next` if its current status is in
    /// `expected` and [`TransactionStatus::can_transition_to`] allows the
    /// edge. Returns `false` when no row matched.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn transition_status(
        &self,
        contract_id: &ContractId,
        expected: &[TransactionStatus],
        next: TransactionStatus,
    ) -> Result<bool, LedgerError>;

    /// Records the client's on-chain tx hash without touching status.
    /// Returns `false` when no transaction exists for the contract id.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn set_tx_hash(&self, contract_id: &ContractId, tx_hash: &str)
    -> Result<bool, LedgerError>;

    /// Applies `FAILED → REFUNDED` and stores the refund tx hash.
    /// Returns `false` if the transaction is missing or not `FAILED`.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn mark_refunded(&self, contract_id: &ContractId, tx_hash: &str)
    -> Result<bool, LedgerError>;

    /// Lists a user's transactions, newest first, at most `limit` rows.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn transactions_for_user(
        &self,
        user_address: &str,
        limit: u32,
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// Lists every transaction currently in `status`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn transactions_with_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, LedgerError>;

    /// Atomically stores `payment` and moves its transaction
    /// `PENDING → CACHED`, recording the secret on the transaction.
    /// Returns `false` if the transaction was not `PENDING`.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn cache_payment(&self, payment: &CachedPayment) -> Result<bool, LedgerError>;

    /// Looks up the cached payment for a contract id.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn cached_payment(
        &self,
        contract_id: &ContractId,
    ) -> Result<Option<CachedPayment>, LedgerError>;

    /// Atomically moves the transaction `CACHED → COMPLETED` and deletes
    /// its cached payment. Returns `false` if it was not `CACHED`.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn settle_cached_payment(&self, contract_id: &ContractId) -> Result<bool, LedgerError>;

    /// Returns the most recent balance snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn latest_snapshot(&self) -> Result<Option<ChannelBalanceSnapshot>, LedgerError>;

    /// Persists `snapshot` and deletes all but the `retain` newest.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError`] on storage failure.
    async fn record_snapshot(
        &self,
        snapshot: &ChannelBalanceSnapshot,
        retain: usize,
    ) -> Result<(), LedgerError>;
}
