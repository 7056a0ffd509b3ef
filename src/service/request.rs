//! Inbound request payloads, one per protocol message kind.
//!
//! Fields default when absent so that coordinators, not the decoder, decide
//! which requests are incomplete.

use serde::Deserialize;

/// `invoice_send`: pay `ln_invoice` and withdraw the matching HTLC.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceSend {
    /// On-chain contract locking the user's funds.
    pub contract_id: String,
    /// BOLT11 invoice the bridge should pay.
    pub ln_invoice: String,
    /// Hash of the user's contract-creation transaction.
    pub tx_hash: String,
}

/// `initiation_recieve`: start a Lightning → EVM swap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitiationReceive {
    /// Amount to receive on-chain, in satoshis.
    pub amount: u64,
    /// EVM address that will own the HTLC.
    pub recipient: String,
    /// Client-chosen SHA-256 hashlock.
    pub hashlock: String,
}

/// `tx_hash`: the client reports its on-chain transaction hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TxHashNotice {
    /// Contract the hash belongs to.
    pub contract_id: String,
    /// Transaction hash.
    pub tx_hash: String,
}

/// `relay_request`: withdraw `contract_id` on the client's behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayRequest {
    /// Contract to withdraw.
    pub contract_id: String,
    /// Preimage opening the contract's hashlock.
    pub preimage: String,
}
