//! Relayed withdrawals: the bridge pays gas to withdraw a contract for a
//! client that already knows the preimage.

use super::reply::{Replies, ReplyStatus, SwapReply};
use super::request::RelayRequest;
use super::{SwapError, SwapService};
use crate::domain::{ContractId, Preimage};

impl SwapService {
    /// Handles a `relay_request`, answering with a `relay_response`.
    pub async fn process_relay_request(&self, request: &RelayRequest, replies: &Replies) {
        let (Ok(contract_id), Ok(preimage)) = (
            request.contract_id.parse::<ContractId>(),
            request.preimage.parse::<Preimage>(),
        ) else {
            replies.send(SwapReply::error("Invalid relay request."));
            return;
        };

        let Some(_lease) = self.pending.try_acquire(contract_id) else {
            replies.send(SwapReply::relay(ReplyStatus::Error, String::new(), contract_id));
            return;
        };

        match self.relay_withdraw(contract_id, &preimage).await {
            Ok(tx_hash) => {
                tracing::info!(%contract_id, %tx_hash, "relayed withdrawal submitted");
                replies.send(SwapReply::relay(ReplyStatus::Success, tx_hash, contract_id));
            }
            Err(e) => {
                tracing::warn!(%contract_id, error = %e, "relayed withdrawal failed");
                replies.send(SwapReply::relay(ReplyStatus::Error, String::new(), contract_id));
            }
        }
    }

    async fn relay_withdraw(
        &self,
        contract_id: ContractId,
        preimage: &Preimage,
    ) -> Result<String, SwapError> {
        if !self.chain.have_contract(&contract_id).await? {
            return Err(SwapError::rejected("Contract does not exist."));
        }
        let contract = self.chain.get_contract(&contract_id).await?;
        if !contract.is_open() {
            return Err(SwapError::rejected("Contract is already closed."));
        }
        if preimage.hashlock() != contract.hashlock {
            return Err(SwapError::rejected("Preimage does not match the hashlock."));
        }
        Ok(self.chain.withdraw(&contract_id, preimage).await?)
    }
}
