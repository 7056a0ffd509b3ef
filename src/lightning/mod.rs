//! Lightning node surface used by the swap coordinators.
//!
//! [`LightningNode`] covers invoice creation, hold-invoice lifecycle,
//! invoice subscriptions, outbound payment and channel balances. The
//! production implementation is [`LndRestNode`]; [`UnconfiguredNode`] stands
//! in when no node is configured and the bridge runs in `MOCK` status.
//!
//! Subscriptions are plain streams: dropping an [`InvoiceSubscription`]
//! unsubscribes.

pub mod invoice;
pub mod lnd;
pub mod unconfigured;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::{ChannelBalance, Hashlock, Preimage};

pub use invoice::{DecodedInvoice, decode_invoice};
pub use lnd::LndRestNode;
pub use unconfigured::UnconfiguredNode;

/// Errors raised by a [`LightningNode`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum LightningError {
    /// The client could not be built from its configuration.
    #[error("invalid lightning configuration: {0}")]
    Config(String),

    /// No node is configured.
    #[error("no lightning node configured")]
    Unavailable,

    /// The request never reached the node or the response was unreadable.
    #[error("lightning transport error: {0}")]
    Transport(String),

    /// The node answered with an error status.
    #[error("lightning node returned {status}: {message}")]
    Rpc {
        /// HTTP status code.
        status: u16,
        /// Error text reported by the node.
        message: String,
    },

    /// An outbound payment failed.
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// A BOLT11 string could not be decoded.
    #[error("invalid invoice: {0}")]
    InvalidInvoice(String),
}

/// Invoice created by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInvoice {
    /// Payment hash, also the id used to subscribe, settle and cancel.
    pub id: Hashlock,
    /// BOLT11 payment request.
    pub request: String,
}

/// Observed state of an invoice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvoiceUpdate {
    /// The invoice was paid and settled.
    pub is_confirmed: bool,
    /// A hold invoice has accepted HTLCs that await settlement.
    pub is_held: bool,
    /// The invoice was canceled or expired.
    pub is_canceled: bool,
}

/// Stream of invoice state changes.
pub type InvoiceSubscription = BoxStream<'static, Result<InvoiceUpdate, LightningError>>;

/// Outcome of a successful outbound payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payment {
    /// Preimage released by the payee.
    pub secret: Preimage,
    /// Routing fee paid, in satoshis.
    pub fee: u64,
}

/// Narrow client for the bridge's Lightning node.
#[async_trait]
pub trait LightningNode: Send + Sync + std::fmt::Debug {
    /// Creates a regular invoice for `amount` sats.
    ///
    /// # Errors
    ///
    /// Returns a [`LightningError`] if the node rejects the request.
    async fn create_invoice(
        &self,
        amount: u64,
        memo: &str,
        expiry_secs: u64,
    ) -> Result<CreatedInvoice, LightningError>;

    /// Creates a hold invoice locked to `hashlock` that expires
    /// `expiry_secs` from now.
    ///
    /// # Errors
    ///
    /// Returns a [`LightningError`] if the node rejects the request.
    async fn create_hold_invoice(
        &self,
        hashlock: &Hashlock,
        amount: u64,
        expiry_secs: u64,
    ) -> Result<CreatedInvoice, LightningError>;

    /// Subscribes to state changes of the invoice with payment hash `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`LightningError`] if the subscription cannot be opened.
    async fn subscribe_to_invoice(&self, id: &Hashlock)
    -> Result<InvoiceSubscription, LightningError>;

    /// Settles a held invoice with its preimage.
    ///
    /// # Errors
    ///
    /// Returns a [`LightningError`] if the node rejects the settlement.
    async fn settle_hold_invoice(&self, secret: &Preimage) -> Result<(), LightningError>;

    /// Cancels a hold invoice, releasing any held HTLCs.
    ///
    /// # Errors
    ///
    /// Returns a [`LightningError`] if the node rejects the cancellation.
    async fn cancel_hold_invoice(&self, id: &Hashlock) -> Result<(), LightningError>;

    /// Pays `request`, spending at most `max_fee` sats on routing.
    ///
    /// # Errors
    ///
    /// Returns [`LightningError::PaymentFailed`] if no route succeeds.
    async fn pay(&self, request: &str, max_fee: u64) -> Result<Payment, LightningError>;

    /// Lists the balances of every open channel.
    ///
    /// # Errors
    ///
    /// Returns a [`LightningError`] if the node cannot be queried.
    async fn channels(&self) -> Result<Vec<ChannelBalance>, LightningError>;

    /// Decodes a BOLT11 payment request.
    ///
    /// # Errors
    ///
    /// Returns [`LightningError::InvalidInvoice`] if `request` is not a
    /// valid invoice.
    fn decode_invoice(&self, request: &str) -> Result<DecodedInvoice, LightningError> {
        decode_invoice(request)
    }
}
