//! Request validation shared by the coordinators.
//!
//! Every failure is a [`SwapError::Rejected`] whose message is shown to the
//! client verbatim, so messages stay free of internal detail.

use ethers::types::Address;
use ethers::utils::to_checksum;

use super::SwapError;
use super::request::InitiationReceive;
use crate::chain::HtlcContract;
use crate::config::ProviderConfig;
use crate::domain::Hashlock;
use crate::lightning::DecodedInvoice;

/// Validated receive-flow parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveParams {
    /// Amount in satoshis.
    pub amount: u64,
    /// Checksummed recipient address.
    pub recipient: String,
    /// Hashlock for the hold invoice and the HTLC.
    pub hashlock: Hashlock,
}

fn within_limits(amount: u64, provider: &ProviderConfig) -> bool {
    (provider.min_sats..=provider.max_sats).contains(&amount)
}

/// Checks that `invoice` is the payment `contract` was funded for.
///
/// Returns the amount in satoshis.
///
/// # Errors
///
/// Returns [`SwapError::Rejected`] describing the first mismatch.
pub fn validate_send(
    invoice: &DecodedInvoice,
    contract: &HtlcContract,
    signer_address: &str,
    provider: &ProviderConfig,
    now: u64,
) -> Result<u64, SwapError> {
    if !contract.receiver.eq_ignore_ascii_case(signer_address) {
        return Err(SwapError::rejected("Contract receiver is not the bridge."));
    }
    if !contract.is_open() {
        return Err(SwapError::rejected(
            "Contract has already been withdrawn or refunded.",
        ));
    }
    if invoice.payment_hash != contract.hashlock {
        return Err(SwapError::rejected(
            "Invoice payment hash does not match the contract hashlock.",
        ));
    }
    let Some(amount) = invoice.amount_sats() else {
        return Err(SwapError::rejected("Invoice must specify a whole satoshi amount."));
    };
    if amount != contract.amount {
        return Err(SwapError::rejected(
            "Invoice amount does not match the contract amount.",
        ));
    }
    if !within_limits(amount, provider) {
        return Err(SwapError::rejected("Amount is outside the provider limits."));
    }
    if invoice.expires_at <= now {
        return Err(SwapError::rejected("Invoice has expired."));
    }
    if contract.timelock <= invoice.expires_at {
        return Err(SwapError::rejected(
            "Contract timelock expires before the invoice.",
        ));
    }
    Ok(amount)
}

/// Validates an `initiation_recieve` request.
///
/// # Errors
///
/// Returns [`SwapError::Rejected`] if the amount is out of bounds, the
/// hashlock is not 32 bytes of hex or the recipient is not an address.
pub fn validate_receive(
    request: &InitiationReceive,
    provider: &ProviderConfig,
) -> Result<ReceiveParams, SwapError> {
    if !within_limits(request.amount, provider) {
        return Err(SwapError::rejected("Amount is outside the provider limits."));
    }
    let hashlock: Hashlock = request
        .hashlock
        .parse()
        .map_err(|_| SwapError::rejected("Invalid hashlock."))?;
    let recipient: Address = request
        .recipient
        .trim()
        .parse()
        .map_err(|_| SwapError::rejected("Invalid recipient address."))?;

    Ok(ReceiveParams {
        amount: request.amount,
        recipient: to_checksum(&recipient, None),
        hashlock,
    })
}
