//! The coordinator object shared by every session.

use std::sync::Arc;

use crate::chain::HtlcChain;
use crate::config::{FlowTimings, ProviderConfig};
use crate::domain::{ContractId, PendingContracts};
use crate::lightning::LightningNode;
use crate::persistence::Ledger;

use super::request::TxHashNotice;
use super::{ServerStatus, SolvencyMonitor};

/// Static settings of a [`SwapService`].
#[derive(Debug, Clone)]
pub struct SwapSettings {
    /// Operating mode.
    pub status: ServerStatus,
    /// Limits and fees.
    pub provider: ProviderConfig,
    /// Flow delays and deadlines.
    pub timings: FlowTimings,
    /// Signer balance (wei) required before cached withdrawals are retried.
    pub signer_min_balance_wei: u128,
}

/// Swap coordinator.
///
/// Constructed once at startup and shared by handle; every session
/// dispatches into the same instance, so the pending-contract guard spans
/// all connections.
#[derive(Debug)]
pub struct SwapService {
    pub(super) ledger: Arc<dyn Ledger>,
    pub(super) chain: Arc<dyn HtlcChain>,
    pub(super) lightning: Arc<dyn LightningNode>,
    pub(super) solvency: Arc<SolvencyMonitor>,
    pub(super) pending: PendingContracts,
    pub(super) settings: SwapSettings,
}

impl SwapService {
    /// Creates a new `SwapService`.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn Ledger>,
        chain: Arc<dyn HtlcChain>,
        lightning: Arc<dyn LightningNode>,
        solvency: Arc<SolvencyMonitor>,
        settings: SwapSettings,
    ) -> Self {
        Self {
            ledger,
            chain,
            lightning,
            solvency,
            pending: PendingContracts::new(),
            settings,
        }
    }

    /// Operating mode.
    #[must_use]
    pub const fn status(&self) -> ServerStatus {
        self.settings.status
    }

    /// Limits and fees advertised to clients.
    #[must_use]
    pub const fn provider(&self) -> &ProviderConfig {
        &self.settings.provider
    }

    /// The pending-contract guard.
    #[must_use]
    pub const fn pending_contracts(&self) -> &PendingContracts {
        &self.pending
    }

    /// Returns `true` if the signer can currently pay for withdrawals.
    ///
    /// A failed balance read counts as unfunded.
    pub async fn signer_active(&self) -> bool {
        match self.chain.signer_balance().await {
            Ok(balance) => {
                let active = balance >= self.settings.signer_min_balance_wei;
                tracing::info!(balance_wei = %balance, active, "signer balance checked");
                active
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to read signer balance");
                false
            }
        }
    }

    /// Records the client's on-chain transaction hash for a contract.
    ///
    /// Never changes the transaction's status and sends no reply.
    pub async fn handle_tx_hash(&self, notice: &TxHashNotice) {
        let Ok(contract_id) = notice.contract_id.parse::<ContractId>() else {
            tracing::warn!(contract_id = %notice.contract_id, "tx_hash notice with invalid contract id");
            return;
        };
        if notice.tx_hash.trim().is_empty() {
            tracing::warn!(%contract_id, "tx_hash notice without a hash");
            return;
        }

        match self.ledger.set_tx_hash(&contract_id, notice.tx_hash.trim()).await {
            Ok(true) => tracing::info!(%contract_id, tx_hash = %notice.tx_hash, "recorded client tx hash"),
            Ok(false) => tracing::warn!(%contract_id, "tx_hash notice for unknown contract"),
            Err(e) => tracing::error!(%contract_id, error = %e, "failed to record tx hash"),
        }
    }
}
