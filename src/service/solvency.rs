//! Lightning liquidity reconciliation.
//!
//! After every on-chain withdrawal (and once at startup) the bridge sums its
//! channel balances and compares `local + remote` against the last stored
//! snapshot. The combined balance may only grow. A drop is tolerated while
//! value is still unsettled in flight, for at most the configured timeout;
//! any other drop is treated as fund loss and halts the process.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::FlowTimings;
use crate::domain::ChannelBalanceSnapshot;
use crate::lightning::{LightningError, LightningNode};
use crate::persistence::{Ledger, LedgerError, SNAPSHOT_RETENTION};

/// Reconciliation failure.
#[derive(Debug, thiserror::Error)]
pub enum SolvencyError {
    /// Channel balances could not be read.
    #[error("failed to read channel balances: {0}")]
    Lightning(#[from] LightningError),

    /// Snapshots could not be read or written.
    #[error("failed to access balance snapshots: {0}")]
    Ledger(#[from] LedgerError),

    /// The combined balance dropped with nothing in flight.
    #[error("combined balance fell from {previous} to {current} sats with no unsettled balance")]
    FundLoss {
        /// Last stored combined balance.
        previous: u64,
        /// Newly measured combined balance.
        current: u64,
    },

    /// The combined balance stayed below the baseline past the grace window.
    #[error(
        "combined balance stayed below {previous} sats ({current}) for {waited:?} with {unsettled} sats unsettled"
    )]
    Timeout {
        /// Last stored combined balance.
        previous: u64,
        /// Last measured combined balance.
        current: u64,
        /// Last measured unsettled balance.
        unsettled: u64,
        /// Time spent retrying.
        waited: Duration,
    },
}

impl SolvencyError {
    /// Returns `true` for the fatal outcomes that indicate lost funds.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        matches!(self, Self::FundLoss { .. } | Self::Timeout { .. })
    }
}

/// Called with the violation before a fatal solvency failure returns.
pub type HaltHook = Arc<dyn Fn(&SolvencyError) + Send + Sync>;

fn terminate_process(violation: &SolvencyError) {
    tracing::error!(error = %violation, "potential fund loss detected, stopping the bridge");
    std::process::exit(1);
}

/// Serialized reconciler of Lightning balances against stored snapshots.
pub struct SolvencyMonitor {
    ledger: Arc<dyn Ledger>,
    lightning: Arc<dyn LightningNode>,
    retry_interval: Duration,
    timeout: Duration,
    lock: Mutex<()>,
    halt: HaltHook,
}

impl std::fmt::Debug for SolvencyMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolvencyMonitor")
            .field("retry_interval", &self.retry_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SolvencyMonitor {
    /// Creates a monitor that terminates the process on a violation.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn Ledger>,
        lightning: Arc<dyn LightningNode>,
        timings: &FlowTimings,
    ) -> Self {
        Self {
            ledger,
            lightning,
            retry_interval: timings.solvency_retry_interval,
            timeout: timings.solvency_timeout,
            lock: Mutex::new(()),
            halt: Arc::new(terminate_process),
        }
    }

    /// Replaces the action taken on a violation.
    #[must_use]
    pub fn with_halt_hook(mut self, halt: HaltHook) -> Self {
        self.halt = halt;
        self
    }

    /// Measures channel balances and checks them against the last snapshot.
    ///
    /// On success the new snapshot is stored and older ones are pruned to
    /// the two most recent. Concurrent calls run one at a time.
    ///
    /// # Errors
    ///
    /// Returns [`SolvencyError::FundLoss`] or [`SolvencyError::Timeout`] on
    /// a violation (nothing is stored), or a transient Lightning / ledger
    /// error.
    pub async fn reconcile(&self) -> Result<ChannelBalanceSnapshot, SolvencyError> {
        let _serial = self.lock.lock().await;
        let started = Instant::now();

        loop {
            let channels = self.lightning.channels().await?;
            let current = ChannelBalanceSnapshot::from_channels(&channels, Utc::now());

            let Some(previous) = self.ledger.latest_snapshot().await? else {
                self.ledger
                    .record_snapshot(&current, SNAPSHOT_RETENTION)
                    .await?;
                tracing::info!(
                    combined = current.combined_balance,
                    "recorded initial channel balance snapshot"
                );
                return Ok(current);
            };

            if current.combined_balance >= previous.combined_balance {
                self.ledger
                    .record_snapshot(&current, SNAPSHOT_RETENTION)
                    .await?;
                tracing::info!(
                    local = current.total_local_balance,
                    remote = current.total_remote_balance,
                    combined = current.combined_balance,
                    "channel balances reconciled"
                );
                return Ok(current);
            }

            if current.total_unsettled_balance == 0 {
                return Err(SolvencyError::FundLoss {
                    previous: previous.combined_balance,
                    current: current.combined_balance,
                });
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(SolvencyError::Timeout {
                    previous: previous.combined_balance,
                    current: current.combined_balance,
                    unsettled: current.total_unsettled_balance,
                    waited,
                });
            }

            tracing::warn!(
                previous = previous.combined_balance,
                current = current.combined_balance,
                unsettled = current.total_unsettled_balance,
                "combined balance dropped while value is in flight, retrying"
            );
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    /// Runs [`Self::reconcile`] and invokes the halt hook on a violation.
    ///
    /// Transient errors are logged and yield `None`.
    pub async fn reconcile_or_halt(&self) -> Option<ChannelBalanceSnapshot> {
        match self.reconcile().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) if e.is_violation() => {
                (self.halt)(&e);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "balance reconciliation skipped");
                None
            }
        }
    }
}
