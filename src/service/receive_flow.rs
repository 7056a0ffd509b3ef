//! Receive-flow: the user pays a Lightning hold invoice and the bridge locks
//! the same amount on-chain under the user's hashlock.
//!
//! ```text
//! initiation invoice ──paid──▶ hold invoice ──held──▶ newContract
//!        │                        │                       │
//!     timeout                  timeout               poll contract
//!        ▼                        ▼                  ┌────┴─────┐
//!      error               cancel + error       withdrawn    expired
//!                                                    ▼          ▼
//!                                 PENDING, settle, COMPLETED  cancel + refund
//! ```
//!
//! No transaction row exists until the user has withdrawn on-chain, which
//! reveals the preimage the bridge needs to settle its Lightning leg. The
//! row is written as `PENDING` before settlement so a withdrawal is never
//! lost when the node refuses to settle.

use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt as _;
use tokio::time::Instant;

use super::reply::{Replies, SwapReply};
use super::request::InitiationReceive;
use super::validation::{ReceiveParams, validate_receive};
use super::{ServerStatus, SwapError, SwapService};
use crate::chain::HtlcContract;
use crate::domain::{
    ContractId, Hashlock, NewTransaction, Preimage, TransactionStatus, TransactionType,
};
use crate::lightning::{InvoiceUpdate, LightningError};

const INITIATION_MEMO: &str = "Lightning EVM bridge receive fee";

/// Settlement attempts before the hold invoice is left to the operator.
const SETTLE_ATTEMPTS: u32 = 10;

/// Where the contract watch ended.
enum ContractWatch {
    Revealed {
        preimage: Preimage,
        contract: HtlcContract,
    },
    Expired,
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

impl SwapService {
    /// Handles an `initiation_recieve` request end to end.
    pub async fn process_initiation_receive(&self, request: &InitiationReceive, replies: &Replies) {
        if self.settings.status != ServerStatus::Active {
            replies.send(SwapReply::error("Receiving is unavailable on this server."));
            return;
        }

        let params = match validate_receive(request, &self.settings.provider) {
            Ok(params) => params,
            Err(SwapError::Rejected(message)) => {
                replies.send(SwapReply::error(message));
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "receive validation failed");
                replies.send(SwapReply::error("Invalid request."));
                return;
            }
        };
        let hashlock = params.hashlock;
        tracing::info!(%hashlock, amount = params.amount, recipient = %params.recipient, "receive-flow started");

        let invoice_expiry = self.settings.provider.seconds_till_invoice_expires;
        let initiation = match self
            .lightning
            .create_invoice(self.settings.provider.receive_base_fee, INITIATION_MEMO, invoice_expiry)
            .await
        {
            Ok(invoice) => invoice,
            Err(e) => {
                tracing::error!(%hashlock, error = %e, "failed to create initiation invoice");
                replies.send(SwapReply::error("Failed to create invoice."));
                return;
            }
        };
        replies.send(SwapReply::Initiation {
            ln_invoice: initiation.request.clone(),
        });

        let paid = self
            .await_invoice(&initiation.id, Duration::from_secs(invoice_expiry), |u| u.is_confirmed)
            .await;
        if !paid {
            tracing::info!(%hashlock, "initiation invoice not paid");
            replies.send(SwapReply::error("Initiation invoice was not paid."));
            return;
        }

        self.lock_on_chain(params, &initiation.request, replies).await;
    }

    /// Hold invoice, contract creation and the wait for the user's withdrawal.
    async fn lock_on_chain(&self, params: ReceiveParams, initiation_request: &str, replies: &Replies) {
        let hashlock = params.hashlock;
        let hold_window = self.settings.timings.hold_invoice_expiry;
        let expiry_secs = hold_window.as_secs().max(1);
        let timelock = unix_now().saturating_add(expiry_secs);
        let deadline = Instant::now() + hold_window;

        let hold = match self
            .lightning
            .create_hold_invoice(&hashlock, params.amount, expiry_secs)
            .await
        {
            Ok(invoice) => invoice,
            Err(e) => {
                tracing::error!(%hashlock, error = %e, "failed to create hold invoice");
                replies.send(SwapReply::error("Failed to create Hodl invoice."));
                return;
            }
        };
        replies.send(SwapReply::hold_invoice(hold.request.clone()));

        let held = self
            .await_invoice(&hold.id, deadline.saturating_duration_since(Instant::now()), |u| {
                u.is_held
            })
            .await;
        if !held {
            tracing::info!(%hashlock, "hold invoice not paid in time");
            self.cancel_hold(&hold.id).await;
            replies.send(SwapReply::error("Hodl invoice was not paid in time."));
            return;
        }

        let contract_id = match self
            .chain
            .new_contract(&params.recipient, &hashlock, timelock, params.amount)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(%hashlock, error = %e, "failed to create contract");
                self.cancel_hold(&hold.id).await;
                replies.send(SwapReply::error("Failed to create contract."));
                return;
            }
        };
        tracing::info!(%hashlock, %contract_id, timelock, "contract created");
        replies.send(SwapReply::hold_contract(contract_id));

        match self.watch_contract(contract_id, deadline).await {
            ContractWatch::Revealed { preimage, contract } => {
                let recorded = self
                    .record_receive(contract_id, &contract, initiation_request)
                    .await;
                if !self.settle_hold(&preimage).await {
                    tracing::error!(%contract_id, secret = %preimage, "hold invoice not settled; manual settlement required");
                    replies.send(SwapReply::error("Failed to settle Hodl invoice."));
                    return;
                }
                if recorded {
                    self.complete_receive(contract_id).await;
                }
                replies.send(SwapReply::success("Hodl invoice settled successfully."));
            }
            ContractWatch::Expired => {
                tracing::info!(%contract_id, "contract expired before withdrawal");
                self.cancel_hold(&hold.id).await;
                match self.chain.refund(&contract_id).await {
                    Ok(tx_hash) => tracing::info!(%contract_id, %tx_hash, "expired contract refunded"),
                    Err(e) => tracing::warn!(%contract_id, error = %e, "failed to refund expired contract"),
                }
                replies.send(SwapReply::error("Contract expired before withdrawal."));
            }
        }
    }

    /// Waits up to `within` for an invoice update satisfying `done`.
    ///
    /// Returns `false` on timeout, cancellation or a closed subscription.
    async fn await_invoice(
        &self,
        id: &Hashlock,
        within: Duration,
        done: fn(&InvoiceUpdate) -> bool,
    ) -> bool {
        let mut updates = match self.lightning.subscribe_to_invoice(id).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::error!(invoice = %id, error = %e, "failed to subscribe to invoice");
                return false;
            }
        };

        let wait = async {
            while let Some(update) = updates.next().await {
                match update {
                    Ok(update) if done(&update) => return true,
                    Ok(update) if update.is_canceled => return false,
                    Ok(_) => {}
                    Err(e) => tracing::warn!(invoice = %id, error = %e, "invoice subscription error"),
                }
            }
            false
        };
        tokio::time::timeout(within, wait).await.unwrap_or(false)
    }

    /// Polls the contract until it is withdrawn or `deadline` passes.
    ///
    /// The contract is read once more at the deadline, so a withdrawal that
    /// lands between two polls is never mistaken for expiry.
    async fn watch_contract(&self, contract_id: ContractId, deadline: Instant) -> ContractWatch {
        let interval = self.settings.timings.contract_poll_interval;
        loop {
            match self.chain.get_contract(&contract_id).await {
                Ok(contract) => {
                    if let Some(preimage) = contract.revealed_preimage() {
                        tracing::info!(%contract_id, "preimage revealed on-chain");
                        return ContractWatch::Revealed { preimage, contract };
                    }
                }
                Err(e) => tracing::warn!(%contract_id, error = %e, "failed to read contract"),
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ContractWatch::Expired;
            }
            tokio::time::sleep(interval.min(remaining)).await;
        }
    }

    /// Settles the hold invoice, retrying up to [`SETTLE_ATTEMPTS`] times.
    async fn settle_hold(&self, preimage: &Preimage) -> bool {
        let interval = self.settings.timings.contract_poll_interval;
        for attempt in 1..=SETTLE_ATTEMPTS {
            match self.lightning.settle_hold_invoice(preimage).await {
                Ok(()) => {
                    tracing::info!(hashlock = %preimage.hashlock(), "hold invoice settled");
                    return true;
                }
                Err(e) => {
                    tracing::warn!(hashlock = %preimage.hashlock(), attempt, error = %e, "failed to settle hold invoice");
                }
            }
            if attempt < SETTLE_ATTEMPTS {
                tokio::time::sleep(interval).await;
            }
        }
        false
    }

    async fn cancel_hold(&self, id: &Hashlock) {
        match self.lightning.cancel_hold_invoice(id).await {
            Ok(()) => tracing::info!(invoice = %id, "hold invoice canceled"),
            Err(LightningError::Unavailable) => {}
            Err(e) => tracing::warn!(invoice = %id, error = %e, "failed to cancel hold invoice"),
        }
    }

    /// Writes the `PENDING` received row. Returns `false` if it was not stored.
    async fn record_receive(
        &self,
        contract_id: ContractId,
        contract: &HtlcContract,
        initiation_request: &str,
    ) -> bool {
        let new = NewTransaction {
            status: TransactionStatus::Pending,
            amount: contract.amount,
            tx_hash: String::new(),
            contract_id,
            hash_lock_timestamp: i64::try_from(contract.timelock).unwrap_or(i64::MAX),
            ln_invoice: initiation_request.to_string(),
            user_address: contract.receiver.clone(),
            transaction_type: TransactionType::Received,
        };
        match self.ledger.create_transaction(new).await {
            Ok(tx) => {
                tracing::info!(%contract_id, id = tx.id, "received transaction recorded");
                true
            }
            Err(e) => {
                tracing::error!(%contract_id, error = %e, "failed to record received transaction");
                false
            }
        }
    }

    async fn complete_receive(&self, contract_id: ContractId) {
        match self
            .ledger
            .transition_status(
                &contract_id,
                &[TransactionStatus::Pending],
                TransactionStatus::Completed,
            )
            .await
        {
            Ok(true) => tracing::info!(%contract_id, "receive-flow completed"),
            Ok(false) => tracing::warn!(%contract_id, "received transaction was no longer pending"),
            Err(e) => tracing::error!(%contract_id, error = %e, "failed to mark received transaction completed"),
        }
    }
}
