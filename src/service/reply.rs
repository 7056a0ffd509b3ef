//! Messages coordinators send back to the requesting session.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::ContractId;

/// Outcome class of a status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// The step succeeded.
    Success,
    /// The request failed; nothing further will happen.
    Error,
    /// Accepted and still in progress.
    Pending,
}

/// Replies that carry a `kind` discriminator on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KindedReply {
    /// Hold invoice the client must pay.
    HodlRes {
        /// BOLT11 hold invoice.
        #[serde(rename = "lnInvoice")]
        ln_invoice: String,
    },
    /// On-chain contract created for a held invoice.
    HodlContractRes {
        /// Id of the new HTLC.
        #[serde(rename = "contractId")]
        contract_id: ContractId,
    },
    /// Result of a relayed withdrawal.
    RelayResponse {
        /// Outcome.
        status: ReplyStatus,
        /// Withdrawal transaction hash, empty on failure.
        #[serde(rename = "txHash")]
        tx_hash: String,
        /// Contract that was withdrawn.
        #[serde(rename = "contractId")]
        contract_id: ContractId,
    },
}

/// Any message a coordinator can send to its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SwapReply {
    /// `{status, message}`.
    Status {
        /// Outcome.
        status: ReplyStatus,
        /// Human-readable message.
        message: String,
    },
    /// `{lnInvoice}`: the receive-flow initiation invoice.
    Initiation {
        /// BOLT11 invoice covering the bridge's base fee.
        #[serde(rename = "lnInvoice")]
        ln_invoice: String,
    },
    /// A reply tagged with `kind`.
    Kinded(KindedReply),
}

impl SwapReply {
    /// `{status: "success", message}`.
    pub fn success(message: impl Into<String>) -> Self {
        Self::Status {
            status: ReplyStatus::Success,
            message: message.into(),
        }
    }

    /// `{status: "error", message}`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Status {
            status: ReplyStatus::Error,
            message: message.into(),
        }
    }

    /// `{status: "pending", message}`.
    pub fn pending(message: impl Into<String>) -> Self {
        Self::Status {
            status: ReplyStatus::Pending,
            message: message.into(),
        }
    }

    /// `{kind: "hodl_res", lnInvoice}`.
    #[must_use]
    pub const fn hold_invoice(ln_invoice: String) -> Self {
        Self::Kinded(KindedReply::HodlRes { ln_invoice })
    }

    /// `{kind: "hodl_contract_res", contractId}`.
    #[must_use]
    pub const fn hold_contract(contract_id: ContractId) -> Self {
        Self::Kinded(KindedReply::HodlContractRes { contract_id })
    }

    /// `{kind: "relay_response", status, txHash, contractId}`.
    #[must_use]
    pub const fn relay(status: ReplyStatus, tx_hash: String, contract_id: ContractId) -> Self {
        Self::Kinded(KindedReply::RelayResponse {
            status,
            tx_hash,
            contract_id,
        })
    }

    /// Status of a `{status, message}` reply.
    #[must_use]
    pub const fn status(&self) -> Option<ReplyStatus> {
        match self {
            Self::Status { status, .. }
            | Self::Kinded(KindedReply::RelayResponse { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Sending half of a session's reply queue.
///
/// Sending never blocks and never fails: replies to a closed session are
/// dropped.
#[derive(Debug, Clone)]
pub struct Replies {
    sender: mpsc::UnboundedSender<SwapReply>,
}

impl Replies {
    /// Creates a reply queue, returning the sender and its receiver.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SwapReply>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queues `reply` for the session.
    pub fn send(&self, reply: SwapReply) {
        if self.sender.send(reply).is_err() {
            tracing::debug!("session closed, reply dropped");
        }
    }
}
