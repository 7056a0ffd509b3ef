//! Placeholder node for deployments without Lightning credentials.

use async_trait::async_trait;

use super::{CreatedInvoice, InvoiceSubscription, LightningError, LightningNode, Payment};
use crate::domain::{ChannelBalance, Hashlock, Preimage};

/// [`LightningNode`] that rejects every call with
/// [`LightningError::Unavailable`]. Invoice decoding still works.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredNode;

#[async_trait]
impl LightningNode for UnconfiguredNode {
    async fn create_invoice(
        &self,
        _amount: u64,
        _memo: &str,
        _expiry_secs: u64,
    ) -> Result<CreatedInvoice, LightningError> {
        Err(LightningError::Unavailable)
    }

    async fn create_hold_invoice(
        &self,
        _hashlock: &Hashlock,
        _amount: u64,
        _expiry_secs: u64,
    ) -> Result<CreatedInvoice, LightningError> {
        Err(LightningError::Unavailable)
    }

    async fn subscribe_to_invoice(
        &self,
        _id: &Hashlock,
    ) -> Result<InvoiceSubscription, LightningError> {
        Err(LightningError::Unavailable)
    }

    async fn settle_hold_invoice(&self, _secret: &Preimage) -> Result<(), LightningError> {
        Err(LightningError::Unavailable)
    }

    async fn cancel_hold_invoice(&self, _id: &Hashlock) -> Result<(), LightningError> {
        Err(LightningError::Unavailable)
    }

    async fn pay(&self, _request: &str, _max_fee: u64) -> Result<Payment, LightningError> {
        Err(LightningError::Unavailable)
    }

    async fn channels(&self) -> Result<Vec<ChannelBalance>, LightningError> {
        Err(LightningError::Unavailable)
    }
}
