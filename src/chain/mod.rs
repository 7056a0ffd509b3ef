//! On-chain HTLC contract surface.
//!
//! [`HtlcChain`] wraps the four contract operations the coordinators need
//! (create, withdraw, refund, read) plus the signer balance check used to
//! report whether the bridge can currently pay gas. [`evm::EvmHtlcChain`]
//! is the `ethers` implementation against a deployed `HashedTimelock`.
//!
//! Amounts cross this boundary in satoshis; conversion to wei happens
//! inside the implementation at [`WEI_PER_SAT`].

pub mod evm;

use async_trait::async_trait;

use crate::domain::{ContractId, Hashlock, Preimage};

pub use evm::EvmHtlcChain;

/// Wei per satoshi: 1 sat = 10 gwei.
pub const WEI_PER_SAT: u128 = 10_000_000_000;

/// Errors raised by an [`HtlcChain`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The client could not be constructed from its configuration.
    #[error("invalid chain configuration: {0}")]
    Config(String),

    /// An RPC or contract call failed before a receipt was obtained.
    #[error("contract call failed: {0}")]
    Call(String),

    /// The transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    Reverted(String),

    /// The transaction was dropped from the mempool.
    #[error("transaction dropped before inclusion")]
    Dropped,

    /// The creation receipt did not contain the expected event.
    #[error("contract creation event not found in receipt {0}")]
    MissingEvent(String),
}

/// Snapshot of an HTLC as stored by the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtlcContract {
    /// Address that funded the contract.
    pub sender: String,
    /// Address entitled to withdraw with the preimage.
    pub receiver: String,
    /// Locked value in satoshis (wei / [`WEI_PER_SAT`], truncated).
    pub amount: u64,
    /// SHA-256 commitment.
    pub hashlock: Hashlock,
    /// Unix timestamp after which the sender may refund.
    pub timelock: u64,
    /// Whether the receiver withdrew.
    pub withdrawn: bool,
    /// Whether the sender refunded.
    pub refunded: bool,
    /// Revealed preimage; `None` while the contract stores zero.
    pub preimage: Option<Preimage>,
}

impl HtlcContract {
    /// The only canonical proof that a secret was revealed: the contract
    /// is withdrawn and holds a nonzero preimage.
    #[must_use]
    pub fn revealed_preimage(&self) -> Option<Preimage> {
        if self.withdrawn {
            self.preimage.filter(|p| !p.is_zero())
        } else {
            None
        }
    }

    /// Returns `true` if neither withdrawn nor refunded.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.withdrawn && !self.refunded
    }
}

/// Converts wei to whole satoshis, truncating sub-satoshi dust.
#[must_use]
pub fn wei_to_sats(wei: u128) -> u64 {
    u64::try_from(wei / WEI_PER_SAT).unwrap_or(u64::MAX)
}

/// Converts satoshis to wei.
#[must_use]
pub fn sats_to_wei(sats: u64) -> u128 {
    u128::from(sats).saturating_mul(WEI_PER_SAT)
}

/// Narrow client for the on-chain HTLC contract and the bridge signer.
///
/// Implementations must be safe for concurrent use. Nonce ordering across
/// concurrent writes from the shared signer is the implementation's
/// responsibility.
#[async_trait]
pub trait HtlcChain: Send + Sync + std::fmt::Debug {
    /// Address of the bridge signer (0x-prefixed, checksummed).
    fn signer_address(&self) -> String;

    /// Current signer balance in wei.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] if the RPC call fails.
    async fn signer_balance(&self) -> Result<u128, ChainError>;

    /// Locks `amount` sats worth of value for `receiver` under `hashlock`
    /// until `timelock`, returning the id emitted by the creation event.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] if the transaction fails or the event is
    /// missing from its receipt.
    async fn new_contract(
        &self,
        receiver: &str,
        hashlock: &Hashlock,
        timelock: u64,
        amount: u64,
    ) -> Result<ContractId, ChainError>;

    /// Withdraws a contract with its preimage, returning the tx hash.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] if the transaction fails or reverts.
    async fn withdraw(
        &self,
        contract_id: &ContractId,
        preimage: &Preimage,
    ) -> Result<String, ChainError>;

    /// Refunds an expired contract to its sender, returning the tx hash.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] if the transaction fails or reverts.
    async fn refund(&self, contract_id: &ContractId) -> Result<String, ChainError>;

    /// Returns `true` if the contract exists.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] if the call fails.
    async fn have_contract(&self, contract_id: &ContractId) -> Result<bool, ChainError>;

    /// Reads the contract's stored fields.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] if the call fails.
    async fn get_contract(&self, contract_id: &ContractId) -> Result<HtlcContract, ChainError>;
}
