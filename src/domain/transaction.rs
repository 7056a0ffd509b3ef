//! Persistent swap records and their status state machine.
//!
//! A [`Transaction`] is created at the first durable checkpoint of a flow
//! and only ever updated afterwards. Its status may only move along the
//! edges accepted by [`TransactionStatus::can_transition_to`]:
//!
//! ```text
//! (none) ──► PENDING ──► COMPLETED
//!               │
//!               ├──────► FAILED ──► REFUNDED
//!               │
//!               └──────► CACHED ──► COMPLETED
//! ```
//!
//! Receive-flow records are created directly in their final state, and a
//! send-flow that fails before its checkpoint may record `FAILED` directly.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{ContractId, Preimage};

/// Lifecycle status of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Validated and checkpointed; the irreversible step has not finished.
    Pending,
    /// Both legs settled.
    Completed,
    /// The flow failed before the irreversible step succeeded.
    Failed,
    /// The user reclaimed the on-chain funds after the timelock expired.
    Refunded,
    /// Lightning leg paid, on-chain withdrawal still owed.
    Cached,
}

impl TransactionStatus {
    /// Returns `true` if a stored record may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed | Self::Failed | Self::Cached)
                | (Self::Failed, Self::Refunded)
                | (Self::Cached, Self::Completed)
        )
    }

    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
            Self::Cached => "CACHED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "REFUNDED" => Ok(Self::Refunded),
            "CACHED" => Ok(Self::Cached),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// Direction of a swap from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// User locked on-chain value and received a Lightning payment.
    Sent,
    /// User paid Lightning and received on-chain value.
    Received,
}

impl TransactionType {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Received => "RECEIVED",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(Self::Sent),
            "RECEIVED" => Ok(Self::Received),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// Fields supplied when a [`Transaction`] is first recorded.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Initial status.
    pub status: TransactionStatus,
    /// Amount in satoshis.
    pub amount: u64,
    /// On-chain transaction hash reported by the client (may be empty).
    pub tx_hash: String,
    /// HTLC contract this record tracks.
    pub contract_id: ContractId,
    /// Unix timestamp bounding the swap (invoice expiry or contract timelock).
    pub hash_lock_timestamp: i64,
    /// BOLT11 invoice associated with the swap.
    pub ln_invoice: String,
    /// EVM address of the user.
    pub user_address: String,
    /// Swap direction.
    pub transaction_type: TransactionType,
}

/// A persisted swap record.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Row identifier.
    pub id: i64,
    /// Current status.
    pub status: TransactionStatus,
    /// Time of the last status change.
    pub date: DateTime<Utc>,
    /// Amount in satoshis.
    pub amount: u64,
    /// On-chain transaction hash reported by the client.
    pub tx_hash: String,
    /// HTLC contract this record tracks.
    #[schema(value_type = String)]
    pub contract_id: ContractId,
    /// Unix timestamp bounding the swap.
    pub hash_lock_timestamp: i64,
    /// BOLT11 invoice associated with the swap.
    pub ln_invoice: String,
    /// EVM address of the user.
    pub user_address: String,
    /// Swap direction.
    pub transaction_type: TransactionType,
    /// Revealed secret, present once a send-flow payment is cached.
    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub secret: Option<Preimage>,
}

impl Transaction {
    /// Materializes a new record with the given row id and timestamp.
    #[must_use]
    pub fn from_new(id: i64, new: NewTransaction, date: DateTime<Utc>) -> Self {
        Self {
            id,
            status: new.status,
            date,
            amount: new.amount,
            tx_hash: new.tx_hash,
            contract_id: new.contract_id,
            hash_lock_timestamp: new.hash_lock_timestamp,
            ln_invoice: new.ln_invoice,
            user_address: new.user_address,
            transaction_type: new.transaction_type,
            secret: None,
        }
    }
}

/// Durable evidence that a send-flow's Lightning leg succeeded while the
/// on-chain withdrawal is still owed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPayment {
    /// Contract to withdraw from.
    pub contract_id: ContractId,
    /// Preimage obtained by paying the user's invoice.
    pub secret: Preimage,
    /// Minimum signer balance (wei) worth attempting a withdrawal with.
    pub required_balance: Option<u128>,
}
