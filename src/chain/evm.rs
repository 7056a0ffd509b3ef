//! `ethers` client for the deployed `HashedTimelock` contract.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::ContractCall;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, TransactionReceipt, U64, U256};
use ethers::utils::{keccak256, to_checksum};
use tokio::sync::Mutex;

use self::bindings::HashedTimelock;
use super::{ChainError, HtlcChain, HtlcContract, sats_to_wei, wei_to_sats};
use crate::domain::{ContractId, Hashlock, Preimage};

#[allow(
    missing_docs,
    missing_debug_implementations,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod bindings {
    ethers::contract::abigen!(
        HashedTimelock,
        r#"[
            event LogHTLCNew(bytes32 indexed contractId, address indexed sender, address indexed receiver, uint256 amount, bytes32 hashlock, uint256 timelock)
            event LogHTLCWithdraw(bytes32 indexed contractId)
            event LogHTLCRefund(bytes32 indexed contractId)
            function newContract(address _receiver, bytes32 _hashlock, uint256 _timelock) external payable returns (bytes32)
            function withdraw(bytes32 _contractId, bytes32 _preimage) external returns (bool)
            function refund(bytes32 _contractId) external returns (bool)
            function haveContract(bytes32 _contractId) external view returns (bool)
            function getContract(bytes32 _contractId) external view returns (address, address, uint256, bytes32, uint256, bool, bool, bytes32)
        ]"#
    );
}

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

const CREATION_EVENT_SIGNATURE: &str =
    "LogHTLCNew(bytes32,address,address,uint256,bytes32,uint256)";

/// HTLC client signing with the bridge's local key over HTTP JSON-RPC.
///
/// Writes are submitted one at a time: the send lock is held until the
/// node has accepted a transaction, so concurrent flows never race on the
/// signer's nonce. Waiting for receipts happens outside the lock.
pub struct EvmHtlcChain {
    client: Arc<SignerClient>,
    contract: HashedTimelock<SignerClient>,
    signer: Address,
    send_lock: Mutex<()>,
}

impl std::fmt::Debug for EvmHtlcChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmHtlcChain")
            .field("signer", &self.signer)
            .field("contract", &self.contract.address())
            .finish_non_exhaustive()
    }
}

impl EvmHtlcChain {
    /// Builds a client for the contract at `contract_address`.
    ///
    /// No network round-trip happens here.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Config`] if the RPC URL, private key, or
    /// contract address is malformed.
    pub fn connect(
        rpc_url: &str,
        private_key: &str,
        chain_id: u64,
        contract_address: &str,
    ) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ChainError::Config(format!("rpc url: {e}")))?;
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| ChainError::Config(format!("private key: {e}")))?
            .with_chain_id(chain_id);
        let signer = wallet.address();
        let address: Address = contract_address
            .parse()
            .map_err(|e| ChainError::Config(format!("contract address: {e}")))?;

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let contract = HashedTimelock::new(address, Arc::clone(&client));

        Ok(Self {
            client,
            contract,
            signer,
            send_lock: Mutex::new(()),
        })
    }

    /// Submits a state-changing call and waits for a successful receipt.
    async fn submit<D>(
        &self,
        call: ContractCall<SignerClient, D>,
        what: &str,
    ) -> Result<TransactionReceipt, ChainError>
    where
        D: Detokenize + Send + Sync,
    {
        let pending = {
            let _nonce_guard = self.send_lock.lock().await;
            call.send()
                .await
                .map_err(|e| ChainError::Call(format!("{what}: {e}")))?
        };

        let receipt = pending
            .await
            .map_err(|e| ChainError::Call(format!("{what}: {e}")))?
            .ok_or(ChainError::Dropped)?;

        if receipt.status != Some(U64::from(1)) {
            return Err(ChainError::Reverted(format!(
                "{:?}",
                receipt.transaction_hash
            )));
        }
        Ok(receipt)
    }
}

/// Saturating `U256` → `u128`.
fn u256_to_u128(value: U256) -> u128 {
    if value > U256::from(u128::MAX) {
        u128::MAX
    } else {
        value.low_u128()
    }
}

/// Saturating `U256` → `u64`.
fn u256_to_u64(value: U256) -> u64 {
    if value > U256::from(u64::MAX) {
        u64::MAX
    } else {
        value.low_u64()
    }
}

fn creation_topic() -> H256 {
    H256::from(keccak256(CREATION_EVENT_SIGNATURE))
}

/// Extracts the id of the contract created in `receipt`.
fn created_contract_id(
    receipt: &TransactionReceipt,
    contract_address: Address,
) -> Option<ContractId> {
    let topic = creation_topic();
    receipt
        .logs
        .iter()
        .find(|log| log.address == contract_address && log.topics.first() == Some(&topic))
        .and_then(|log| log.topics.get(1))
        .map(|id| ContractId::from_bytes(id.to_fixed_bytes()))
}

#[async_trait]
impl HtlcChain for EvmHtlcChain {
    fn signer_address(&self) -> String {
        to_checksum(&self.signer, None)
    }

    async fn signer_balance(&self) -> Result<u128, ChainError> {
        let balance = self
            .client
            .get_balance(self.signer, None)
            .await
            .map_err(|e| ChainError::Call(format!("get balance: {e}")))?;
        Ok(u256_to_u128(balance))
    }

    async fn new_contract(
        &self,
        receiver: &str,
        hashlock: &Hashlock,
        timelock: u64,
        amount: u64,
    ) -> Result<ContractId, ChainError> {
        let receiver: Address = receiver
            .parse()
            .map_err(|e| ChainError::Call(format!("receiver address: {e}")))?;
        let call = self
            .contract
            .new_contract(receiver, *hashlock.as_bytes(), U256::from(timelock))
            .value(U256::from(sats_to_wei(amount)));

        let receipt = self.submit(call, "newContract").await?;
        created_contract_id(&receipt, self.contract.address()).ok_or_else(|| {
            ChainError::MissingEvent(format!("{:?}", receipt.transaction_hash))
        })
    }

    async fn withdraw(
        &self,
        contract_id: &ContractId,
        preimage: &Preimage,
    ) -> Result<String, ChainError> {
        let call = self
            .contract
            .withdraw(*contract_id.as_bytes(), *preimage.as_bytes());
        let receipt = self.submit(call, "withdraw").await?;
        Ok(format!("{:?}", receipt.transaction_hash))
    }

    async fn refund(&self, contract_id: &ContractId) -> Result<String, ChainError> {
        let call = self.contract.refund(*contract_id.as_bytes());
        let receipt = self.submit(call, "refund").await?;
        Ok(format!("{:?}", receipt.transaction_hash))
    }

    async fn have_contract(&self, contract_id: &ContractId) -> Result<bool, ChainError> {
        self.contract
            .have_contract(*contract_id.as_bytes())
            .call()
            .await
            .map_err(|e| ChainError::Call(format!("haveContract: {e}")))
    }

    async fn get_contract(&self, contract_id: &ContractId) -> Result<HtlcContract, ChainError> {
        let (sender, receiver, amount, hashlock, timelock, withdrawn, refunded, preimage) = self
            .contract
            .get_contract(*contract_id.as_bytes())
            .call()
            .await
            .map_err(|e| ChainError::Call(format!("getContract: {e}")))?;

        let preimage = Preimage::from_bytes(preimage);
        Ok(HtlcContract {
            sender: to_checksum(&sender, None),
            receiver: to_checksum(&receiver, None),
            amount: wei_to_sats(u256_to_u128(amount)),
            hashlock: Hashlock::from_bytes(hashlock),
            timelock: u256_to_u64(timelock),
            withdrawn,
            refunded,
            preimage: (!preimage.is_zero()).then_some(preimage),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use ethers::types::Log;

    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
    const CONTRACT: &str = "0x184375F7d9104fc34C523Ee16c1270A16Bb4BFC2";

    #[test]
    fn connect_derives_signer_address() {
        let Ok(chain) = EvmHtlcChain::connect("http://localhost:8545", KEY_ONE, 1, CONTRACT) else {
            panic!("valid configuration should connect");
        };
        assert_eq!(
            chain.signer_address(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn connect_rejects_bad_key() {
        let result = EvmHtlcChain::connect("http://localhost:8545", "nothex", 1, CONTRACT);
        assert!(matches!(result, Err(ChainError::Config(_))));
    }

    #[test]
    fn connect_rejects_bad_contract_address() {
        let result = EvmHtlcChain::connect("http://localhost:8545", KEY_ONE, 1, "0x1234");
        assert!(matches!(result, Err(ChainError::Config(_))));
    }

    #[test]
    fn u256_conversions_saturate() {
        assert_eq!(u256_to_u128(U256::from(5u8)), 5);
        assert_eq!(u256_to_u128(U256::MAX), u128::MAX);
        assert_eq!(u256_to_u64(U256::MAX), u64::MAX);
    }

    #[test]
    fn created_contract_id_reads_first_indexed_topic() {
        let Ok(contract_address) = CONTRACT.parse::<Address>() else {
            panic!("valid address");
        };
        let id = H256::from([0x12; 32]);
        let unrelated = Log {
            address: contract_address,
            topics: vec![H256::from([0xee; 32]), H256::from([0x34; 32])],
            ..Log::default()
        };
        let created = Log {
            address: contract_address,
            topics: vec![creation_topic(), id, H256::zero(), H256::zero()],
            ..Log::default()
        };
        let receipt = TransactionReceipt {
            logs: vec![unrelated, created],
            ..TransactionReceipt::default()
        };

        assert_eq!(
            created_contract_id(&receipt, contract_address),
            Some(ContractId::from_bytes([0x12; 32]))
        );
        assert_eq!(created_contract_id(&receipt, Address::zero()), None);
    }
}
