//! In-process [`Ledger`] used when persistence is disabled.
//!
//! State lives behind a single [`tokio::sync::RwLock`], which makes every
//! operation (including the compare-and-swap transitions) atomic. Nothing
//! survives a restart, so this is only suitable for mock deployments and
//! tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Ledger, LedgerError};
use crate::domain::{
    CachedPayment, ChannelBalanceSnapshot, ContractId, NewTransaction, Transaction,
    TransactionStatus,
};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    transactions: Vec<Transaction>,
    cached: HashMap<ContractId, CachedPayment>,
    snapshots: Vec<ChannelBalanceSnapshot>,
}

impl State {
    fn find_mut(&mut self, contract_id: &ContractId) -> Option<&mut Transaction> {
        self.transactions
            .iter_mut()
            .find(|tx| tx.contract_id == *contract_id)
    }
}

/// Volatile ledger backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<State>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored transaction in insertion order.
    pub async fn all_transactions(&self) -> Vec<Transaction> {
        self.state.read().await.transactions.clone()
    }

    /// Returns every retained snapshot, oldest first.
    pub async fn snapshots(&self) -> Vec<ChannelBalanceSnapshot> {
        self.state.read().await.snapshots.clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        let mut state = self.state.write().await;
        if state.find_mut(&new.contract_id).is_some() {
            return Err(LedgerError::Duplicate(new.contract_id));
        }
        state.next_id = state.next_id.saturating_add(1);
        let tx = Transaction::from_new(state.next_id, new, Utc::now());
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn find_transaction(
        &self,
        contract_id: &ContractId,
    ) -> Result<Option<Transaction>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .find(|tx| tx.contract_id == *contract_id)
            .cloned())
    }

    async fn transition_status(
        &self,
        contract_id: &ContractId,
        expected: &[TransactionStatus],
        next: TransactionStatus,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        match state.find_mut(contract_id) {
            Some(tx) if expected.contains(&tx.status) && tx.status.can_transition_to(next) => {
                tx.status = next;
                tx.date = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_tx_hash(
        &self,
        contract_id: &ContractId,
        tx_hash: &str,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        Ok(state.find_mut(contract_id).is_some_and(|tx| {
            tx.tx_hash = tx_hash.to_string();
            true
        }))
    }

    async fn mark_refunded(
        &self,
        contract_id: &ContractId,
        tx_hash: &str,
    ) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        match state.find_mut(contract_id) {
            Some(tx) if tx.status == TransactionStatus::Failed => {
                tx.status = TransactionStatus::Refunded;
                tx.tx_hash = tx_hash.to_string();
                tx.date = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transactions_for_user(
        &self,
        user_address: &str,
        limit: u32,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let state = self.state.read().await;
        let mut rows: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|tx| tx.user_address.eq_ignore_ascii_case(user_address))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }

    async fn transactions_with_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|tx| tx.status == status)
            .cloned()
            .collect())
    }

    async fn cache_payment(&self, payment: &CachedPayment) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        let Some(tx) = state.find_mut(&payment.contract_id) else {
            return Ok(false);
        };
        if tx.status != TransactionStatus::Pending {
            return Ok(false);
        }
        tx.status = TransactionStatus::Cached;
        tx.secret = Some(payment.secret);
        tx.date = Utc::now();
        state.cached.insert(payment.contract_id, payment.clone());
        Ok(true)
    }

    async fn cached_payment(
        &self,
        contract_id: &ContractId,
    ) -> Result<Option<CachedPayment>, LedgerError> {
        Ok(self.state.read().await.cached.get(contract_id).cloned())
    }

    async fn settle_cached_payment(&self, contract_id: &ContractId) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        let Some(tx) = state.find_mut(contract_id) else {
            return Ok(false);
        };
        if tx.status != TransactionStatus::Cached {
            return Ok(false);
        }
        tx.status = TransactionStatus::Completed;
        tx.date = Utc::now();
        state.cached.remove(contract_id);
        Ok(true)
    }

    async fn latest_snapshot(&self) -> Result<Option<ChannelBalanceSnapshot>, LedgerError> {
        Ok(self.state.read().await.snapshots.last().cloned())
    }

    async fn record_snapshot(
        &self,
        snapshot: &ChannelBalanceSnapshot,
        retain: usize,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state.snapshots.push(snapshot.clone());
        let excess = state.snapshots.len().saturating_sub(retain);
        state.snapshots.drain(..excess);
        Ok(())
    }
}
