//! Send-flow: the user locks value on-chain and the bridge pays their
//! Lightning invoice, then withdraws the contract with the revealed secret.
//!
//! The ledger row is written as `PENDING` before the payment. Once the
//! payment succeeds the bridge holds the secret, and a failed withdrawal
//! becomes a cached payment that the recovery job retries; it is never
//! reported as a plain failure.

use chrono::Utc;

use super::reply::{Replies, SwapReply};
use super::request::InvoiceSend;
use super::validation::validate_send;
use super::{ServerStatus, SwapError, SwapService};
use crate::domain::{
    CachedPayment, ContractId, NewTransaction, TransactionStatus, TransactionType,
};
use crate::lightning::LightningError;
use crate::persistence::LedgerError;

const INVALID_REQUEST: &str = "Invalid Invoice Request";
const ALREADY_PROCESSING: &str = "Contract is already being processed.";
const CONTRACT_MISSING: &str = "Contract does not exist.";
const INVOICE_PENDING: &str = "Invoice pending.";
const WITHDRAWN: &str = "Invoice withdrawn successfully.";
const WITHDRAWAL_QUEUED: &str = "Invoice paid, withdrawal queued for retry.";
const FAILED: &str = "Failed to process invoice.";
const MOCK_PAID: &str = "Invoice paid successfully in mock mode.";

impl SwapService {
    /// Handles an `invoice_send` request.
    ///
    /// At most one send-flow runs per contract id; a concurrent request for
    /// the same id is rejected without touching any state.
    pub async fn process_invoice_send(&self, request: &InvoiceSend, replies: &Replies) {
        let contract_id = match request.contract_id.parse::<ContractId>() {
            Ok(id) if !request.ln_invoice.trim().is_empty() => id,
            _ => {
                replies.send(SwapReply::error(INVALID_REQUEST));
                return;
            }
        };

        let Some(_lease) = self.pending.try_acquire(contract_id) else {
            tracing::info!(%contract_id, "send-flow already in progress");
            replies.send(SwapReply::error(ALREADY_PROCESSING));
            return;
        };

        if self.settings.status == ServerStatus::Mock {
            tracing::info!(%contract_id, "mock mode, simulating payment");
            tokio::time::sleep(self.settings.timings.mock_payment_delay).await;
            replies.send(SwapReply::success(MOCK_PAID));
            return;
        }

        tracing::info!(%contract_id, "send-flow started");
        let draft = match self.prepare_send(contract_id, request).await {
            Ok(draft) => draft,
            Err(SwapError::Rejected(message)) => {
                tracing::info!(%contract_id, reason = %message, "send request rejected");
                replies.send(SwapReply::error(message));
                return;
            }
            Err(e) => {
                tracing::error!(%contract_id, error = %e, "send-flow failed before checkpoint");
                let draft = self.failure_draft(contract_id, request).await;
                self.mark_failed(contract_id, draft).await;
                replies.send(SwapReply::error(FAILED));
                return;
            }
        };

        match self.ledger.create_transaction(draft.clone()).await {
            Ok(_) => {}
            Err(LedgerError::Duplicate(_)) => {
                replies.send(SwapReply::error(
                    "A transaction already exists for this contract.",
                ));
                return;
            }
            Err(e) => {
                tracing::error!(%contract_id, error = %e, "failed to record pending transaction");
                self.mark_failed(contract_id, Some(draft)).await;
                replies.send(SwapReply::error(FAILED));
                return;
            }
        }
        replies.send(SwapReply::pending(INVOICE_PENDING));

        let payment = match self
            .lightning
            .pay(&draft.ln_invoice, self.settings.provider.max_ln_fee)
            .await
        {
            Ok(payment) => payment,
            Err(e) => {
                tracing::error!(%contract_id, error = %e, "lightning payment failed");
                self.mark_failed(contract_id, Some(draft)).await;
                replies.send(SwapReply::error(FAILED));
                return;
            }
        };
        tracing::info!(%contract_id, fee = payment.fee, "invoice paid, withdrawing contract");

        match self.chain.withdraw(&contract_id, &payment.secret).await {
            Ok(tx_hash) => {
                match self
                    .ledger
                    .transition_status(
                        &contract_id,
                        &[TransactionStatus::Pending],
                        TransactionStatus::Completed,
                    )
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(%contract_id, "transaction was no longer pending at completion");
                    }
                    Err(e) => {
                        tracing::error!(%contract_id, %tx_hash, error = %e, "withdrawn but failed to mark transaction completed");
                    }
                }
                tracing::info!(%contract_id, %tx_hash, "send-flow completed");
                self.solvency.reconcile_or_halt().await;
                replies.send(SwapReply::success(WITHDRAWN));
            }
            Err(e) => {
                tracing::warn!(%contract_id, error = %e, "withdrawal failed after payment, caching");
                let cached = CachedPayment {
                    contract_id,
                    secret: payment.secret,
                    required_balance: Some(self.settings.signer_min_balance_wei),
                };
                match self.ledger.cache_payment(&cached).await {
                    Ok(true) => tracing::info!(%contract_id, "cached payment recorded"),
                    Ok(false) => {
                        tracing::error!(%contract_id, secret = %payment.secret, "transaction was not pending, cached payment not recorded; manual withdrawal required");
                    }
                    Err(e) => {
                        tracing::error!(%contract_id, secret = %payment.secret, error = %e, "failed to record cached payment; manual withdrawal required");
                    }
                }
                replies.send(SwapReply::pending(WITHDRAWAL_QUEUED));
            }
        }
    }

    /// Validates the request against the chain and builds the `PENDING` row.
    async fn prepare_send(
        &self,
        contract_id: ContractId,
        request: &InvoiceSend,
    ) -> Result<NewTransaction, SwapError> {
        if !self.chain.have_contract(&contract_id).await? {
            return Err(SwapError::rejected(CONTRACT_MISSING));
        }

        let invoice = match self.lightning.decode_invoice(&request.ln_invoice) {
            Ok(invoice) => invoice,
            Err(LightningError::InvalidInvoice(reason)) => {
                tracing::info!(%contract_id, %reason, "undecodable invoice");
                return Err(SwapError::rejected("Invalid lightning invoice."));
            }
            Err(e) => return Err(e.into()),
        };
        let contract = self.chain.get_contract(&contract_id).await?;
        tracing::debug!(%contract_id, ?contract, "contract details");

        let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let amount = validate_send(
            &invoice,
            &contract,
            &self.chain.signer_address(),
            &self.settings.provider,
            now,
        )?;

        if self.ledger.find_transaction(&contract_id).await?.is_some() {
            return Err(SwapError::rejected(
                "A transaction already exists for this contract.",
            ));
        }

        Ok(NewTransaction {
            status: TransactionStatus::Pending,
            amount,
            tx_hash: request.tx_hash.trim().to_string(),
            contract_id,
            hash_lock_timestamp: i64::try_from(invoice.expires_at).unwrap_or(i64::MAX),
            ln_invoice: invoice.request,
            user_address: contract.sender,
            transaction_type: TransactionType::Sent,
        })
    }

    /// Best-effort row for a request that failed before its checkpoint.
    ///
    /// Needs a decodable invoice; the user address is left empty when the
    /// contract cannot be read.
    async fn failure_draft(
        &self,
        contract_id: ContractId,
        request: &InvoiceSend,
    ) -> Option<NewTransaction> {
        let invoice = match self.lightning.decode_invoice(&request.ln_invoice) {
            Ok(invoice) => invoice,
            Err(e) => {
                tracing::warn!(%contract_id, error = %e, "cannot record failed send without an invoice");
                return None;
            }
        };
        let user_address = match self.chain.get_contract(&contract_id).await {
            Ok(contract) => contract.sender,
            Err(e) => {
                tracing::warn!(%contract_id, error = %e, "recording failed send without a user address");
                String::new()
            }
        };
        Some(NewTransaction {
            status: TransactionStatus::Failed,
            amount: invoice.amount_sats().unwrap_or(0),
            tx_hash: request.tx_hash.trim().to_string(),
            contract_id,
            hash_lock_timestamp: i64::try_from(invoice.expires_at).unwrap_or(i64::MAX),
            ln_invoice: invoice.request,
            user_address,
            transaction_type: TransactionType::Sent,
        })
    }

    /// Moves the row to `FAILED`, creating it from `draft` if it is missing.
    async fn mark_failed(&self, contract_id: ContractId, draft: Option<NewTransaction>) {
        match self
            .ledger
            .transition_status(
                &contract_id,
                &[TransactionStatus::Pending],
                TransactionStatus::Failed,
            )
            .await
        {
            Ok(true) => {
                tracing::info!(%contract_id, "transaction marked failed");
                return;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(%contract_id, error = %e, "failed to mark transaction failed");
                return;
            }
        }

        let exists = matches!(self.ledger.find_transaction(&contract_id).await, Ok(Some(_)));
        if let (false, Some(mut draft)) = (exists, draft) {
            draft.status = TransactionStatus::Failed;
            if let Err(e) = self.ledger.create_transaction(draft).await {
                tracing::error!(%contract_id, error = %e, "failed to record failed transaction");
            }
        }
    }
}
