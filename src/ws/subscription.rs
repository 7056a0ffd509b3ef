//! Per-connection subscription set.
//!
//! Tracks which contract ids a session initiated send-flows for, so that
//! out-of-band outcomes (a recovered withdrawal, a refund) reach the client
//! that is waiting for them.

use std::collections::HashSet;

use crate::domain::ContractId;

/// Contract ids a single WebSocket session follows.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    contract_ids: HashSet<ContractId>,
}

impl SubscriptionManager {
    /// Creates an empty subscription set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Follows `id`.
    pub fn subscribe(&mut self, id: ContractId) {
        self.contract_ids.insert(id);
    }

    /// Stops following `id`.
    pub fn unsubscribe(&mut self, id: &ContractId) {
        self.contract_ids.remove(id);
    }

    /// Returns `true` if events for `id` should be forwarded.
    #[must_use]
    pub fn matches(&self, id: &ContractId) -> bool {
        self.contract_ids.contains(id)
    }

    /// Number of followed contract ids.
    #[must_use]
    pub fn count(&self) -> usize {
        self.contract_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&ContractId::from_bytes([1; 32])));
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let mut mgr = SubscriptionManager::new();
        let id = ContractId::from_bytes([2; 32]);
        mgr.subscribe(id);
        mgr.subscribe(id);
        assert!(mgr.matches(&id));
        assert_eq!(mgr.count(), 1);
        mgr.unsubscribe(&id);
        assert!(!mgr.matches(&id));
    }
}
