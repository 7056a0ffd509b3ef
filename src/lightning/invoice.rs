//! BOLT11 decoding.

use std::str::FromStr as _;

use bitcoin::hashes::Hash as _;
use lightning_invoice::Bolt11Invoice;

use super::LightningError;
use crate::domain::Hashlock;

/// Fields of a BOLT11 invoice the coordinators validate against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInvoice {
    /// The original payment request string.
    pub request: String,
    /// Payment hash the invoice commits to.
    pub payment_hash: Hashlock,
    /// Requested amount in millisatoshis, if the invoice carries one.
    pub amount_msat: Option<u64>,
    /// Creation time, Unix seconds.
    pub timestamp: u64,
    /// Expiry time, Unix seconds.
    pub expires_at: u64,
}

impl DecodedInvoice {
    /// Amount in whole satoshis, or `None` for amountless or
    /// sub-satoshi-precision invoices.
    #[must_use]
    pub fn amount_sats(&self) -> Option<u64> {
        self.amount_msat
            .filter(|msat| msat % 1_000 == 0)
            .map(|msat| msat / 1_000)
    }
}

/// Decodes a BOLT11 payment request.
///
/// # Errors
///
/// Returns [`LightningError::InvalidInvoice`] if the string does not parse
/// or fails semantic checks.
pub fn decode_invoice(request: &str) -> Result<DecodedInvoice, LightningError> {
    let request = request.trim();
    let invoice = Bolt11Invoice::from_str(request)
        .map_err(|e| LightningError::InvalidInvoice(format!("{e:?}")))?;

    let timestamp = invoice.duration_since_epoch().as_secs();
    Ok(DecodedInvoice {
        request: request.to_string(),
        payment_hash: Hashlock::from_bytes(invoice.payment_hash().to_byte_array()),
        amount_msat: invoice.amount_milli_satoshis(),
        timestamp,
        expires_at: timestamp.saturating_add(invoice.expiry_time().as_secs()),
    })
}
