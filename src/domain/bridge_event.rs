//! Domain events published when a background job changes a swap.
//!
//! Sessions subscribe to the [`super::EventBus`] and forward events for
//! contract ids they initiated, so a client that is still connected learns
//! about outcomes that happen outside its own request.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ContractId;

/// Event emitted after an out-of-band swap state change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// The recovery job withdrew a cached payment on-chain.
    CachedPaymentSettled {
        /// Contract that was withdrawn.
        contract_id: ContractId,
        /// Withdrawal transaction hash.
        tx_hash: String,
        /// Settlement timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A failed swap was confirmed refunded on-chain.
    TransactionRefunded {
        /// Contract that was refunded.
        contract_id: ContractId,
        /// Refund transaction hash reported by the client.
        tx_hash: String,
        /// Timestamp of the status change.
        timestamp: DateTime<Utc>,
    },
}

impl BridgeEvent {
    /// Returns the contract id associated with this event.
    #[must_use]
    pub const fn contract_id(&self) -> ContractId {
        match self {
            Self::CachedPaymentSettled { contract_id, .. }
            | Self::TransactionRefunded { contract_id, .. } => *contract_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::CachedPaymentSettled { .. } => "cached_payment_settled",
            Self::TransactionRefunded { .. } => "transaction_refunded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_event_serializes_with_tag() {
        let event = BridgeEvent::CachedPaymentSettled {
            contract_id: ContractId::from_bytes([7; 32]),
            tx_hash: "0xfeed".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type_str(), "cached_payment_settled");
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"cached_payment_settled\""));
        assert!(json.contains("0xfeed"));
    }

    #[test]
    fn contract_id_accessor() {
        let id = ContractId::from_bytes([8; 32]);
        let event = BridgeEvent::TransactionRefunded {
            contract_id: id,
            tx_hash: String::new(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.contract_id(), id);
    }
}
