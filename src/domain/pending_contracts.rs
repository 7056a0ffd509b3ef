//! Per-contract mutual exclusion for in-flight send-flows.
//!
//! [`PendingContracts`] is the only shared mutable structure in the
//! coordinator core. A send-flow acquires a [`ContractLease`] before doing
//! anything else; the lease removes the id again when dropped, so every
//! exit path (success, rejection, error, panic unwinding) releases it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use super::ContractId;

/// Set of contract ids owned by an in-flight send-flow.
#[derive(Debug, Clone, Default)]
pub struct PendingContracts {
    inner: Arc<Mutex<HashSet<ContractId>>>,
}

impl PendingContracts {
    /// Creates an empty guard set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` for the caller.
    ///
    /// Returns `None` if another flow already holds it; the caller must
    /// reject the request without touching any state.
    #[must_use]
    pub fn try_acquire(&self, id: ContractId) -> Option<ContractLease> {
        let mut set = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if set.insert(id) {
            Some(ContractLease {
                id,
                owner: Arc::clone(&self.inner),
            })
        } else {
            None
        }
    }

    /// Number of contract ids currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no contract id is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ownership of one contract id; releases it on drop.
#[derive(Debug)]
pub struct ContractLease {
    id: ContractId,
    owner: Arc<Mutex<HashSet<ContractId>>>,
}

impl Drop for ContractLease {
    fn drop(&mut self) {
        self.owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
