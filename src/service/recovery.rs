//! Cached-payment recovery.
//!
//! A fixed-interval job that retries the on-chain withdrawal of every
//! `CACHED` transaction until it succeeds. There is no backoff and no retry
//! bound: a payment that never clears needs an operator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use super::SolvencyMonitor;
use crate::chain::HtlcChain;
use crate::domain::{BridgeEvent, CachedPayment, EventBus, Transaction, TransactionStatus};
use crate::persistence::Ledger;

/// Counters for one recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Cached transactions found.
    pub attempted: usize,
    /// Transactions moved to `COMPLETED`.
    pub settled: usize,
    /// Transactions skipped for lack of signer funds.
    pub skipped: usize,
}

/// Background job retrying cached withdrawals.
#[derive(Debug)]
pub struct CachedPaymentRecovery {
    ledger: Arc<dyn Ledger>,
    chain: Arc<dyn HtlcChain>,
    solvency: Arc<SolvencyMonitor>,
    event_bus: EventBus,
    interval: Duration,
}

impl CachedPaymentRecovery {
    /// Creates the job; nothing runs until [`Self::run`] or [`Self::tick`].
    #[must_use]
    pub fn new(
        ledger: Arc<dyn Ledger>,
        chain: Arc<dyn HtlcChain>,
        solvency: Arc<SolvencyMonitor>,
        event_bus: EventBus,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            chain,
            solvency,
            event_bus,
            interval,
        }
    }

    /// Runs [`Self::tick`] every interval, forever.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.tick().await;
            if report.attempted > 0 {
                tracing::info!(
                    attempted = report.attempted,
                    settled = report.settled,
                    skipped = report.skipped,
                    "cached payment pass finished"
                );
            }
        }
    }

    /// One recovery pass over every `CACHED` transaction.
    pub async fn tick(&self) -> RecoveryReport {
        let cached = match self
            .ledger
            .transactions_with_status(TransactionStatus::Cached)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "failed to load cached payments");
                return RecoveryReport::default();
            }
        };
        let mut report = RecoveryReport {
            attempted: cached.len(),
            ..RecoveryReport::default()
        };
        if cached.is_empty() {
            tracing::debug!("no cached payments to process");
            return report;
        }

        let balance = match self.chain.signer_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(error = %e, "signer balance unavailable, skipping cached payments");
                report.skipped = cached.len();
                return report;
            }
        };

        for tx in &cached {
            let Some(payment) = self.cached_payment_for(tx).await else {
                continue;
            };
            if let Some(required) = payment.required_balance
                && balance < required
            {
                tracing::warn!(
                    contract_id = %tx.contract_id,
                    balance_wei = %balance,
                    required_wei = %required,
                    "signer underfunded, cached payment deferred"
                );
                report.skipped += 1;
                continue;
            }
            if self.retry(&payment).await {
                report.settled += 1;
            }
        }
        report
    }

    async fn cached_payment_for(&self, tx: &Transaction) -> Option<CachedPayment> {
        match self.ledger.cached_payment(&tx.contract_id).await {
            Ok(Some(payment)) => Some(payment),
            Ok(None) => match tx.secret {
                Some(secret) => Some(CachedPayment {
                    contract_id: tx.contract_id,
                    secret,
                    required_balance: None,
                }),
                None => {
                    tracing::error!(contract_id = %tx.contract_id, "cached transaction has no stored secret");
                    None
                }
            },
            Err(e) => {
                tracing::error!(contract_id = %tx.contract_id, error = %e, "failed to load cached payment");
                None
            }
        }
    }

    /// Withdraws one cached payment; returns `true` once it is settled.
    async fn retry(&self, payment: &CachedPayment) -> bool {
        let contract_id = payment.contract_id;

        let tx_hash = match self.chain.get_contract(&contract_id).await {
            Ok(contract) if contract.withdrawn => {
                tracing::info!(%contract_id, "contract already withdrawn, settling ledger");
                String::new()
            }
            _ => match self.chain.withdraw(&contract_id, &payment.secret).await {
                Ok(tx_hash) => tx_hash,
                Err(e) => {
                    tracing::warn!(%contract_id, error = %e, "cached withdrawal failed, will retry");
                    return false;
                }
            },
        };

        match self.ledger.settle_cached_payment(&contract_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%contract_id, "cached payment was already settled");
                return false;
            }
            Err(e) => {
                tracing::error!(%contract_id, %tx_hash, error = %e, "withdrawn but failed to settle cached payment");
                return false;
            }
        }

        tracing::info!(%contract_id, %tx_hash, "cached payment settled");
        let _ = self.event_bus.publish(BridgeEvent::CachedPaymentSettled {
            contract_id,
            tx_hash,
            timestamp: Utc::now(),
        });
        self.solvency.reconcile_or_halt().await;
        true
    }
}
