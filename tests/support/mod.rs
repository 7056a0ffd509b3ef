//! Scripted collaborators shared by the integration tests.

#![allow(dead_code, clippy::panic)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt as _;
use futures_util::stream;
use tokio::sync::mpsc;

use lightning_evm_bridge::chain::{ChainError, HtlcChain, HtlcContract};
use lightning_evm_bridge::config::{FlowTimings, ProviderConfig};
use lightning_evm_bridge::domain::{ChannelBalance, ContractId, Hashlock, Preimage};
use lightning_evm_bridge::lightning::{
    CreatedInvoice, DecodedInvoice, InvoiceSubscription, InvoiceUpdate, LightningError,
    LightningNode, Payment,
};
use lightning_evm_bridge::persistence::{Ledger, MemoryLedger};
use lightning_evm_bridge::service::{
    HaltHook, Replies, ServerStatus, SolvencyError, SolvencyMonitor, SwapReply, SwapService,
    SwapSettings,
};

/// Address the fake chain signs with.
pub const SIGNER: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

/// Address of the test user.
pub const USER: &str = "0x1111111111111111111111111111111111111111";

/// Signer balance that counts as funded.
pub const MIN_BALANCE_WEI: u128 = 100_000_000_000_000_000;

/// Id the fake node assigns to every initiation invoice.
pub const INITIATION_ID: [u8; 32] = [0xAA; 32];

/// Payment request of every initiation invoice.
pub const INITIATION_REQUEST: &str = "lnbc-initiation";

/// Payment request of every hold invoice.
pub const HOLD_REQUEST: &str = "lnbc-hold";

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

/// Timings short enough for tests.
pub fn fast_timings() -> FlowTimings {
    FlowTimings {
        hold_invoice_expiry: Duration::from_millis(300),
        contract_poll_interval: Duration::from_millis(10),
        cached_payment_interval: Duration::from_millis(10),
        solvency_retry_interval: Duration::from_millis(10),
        solvency_timeout: Duration::from_millis(100),
        invoice_poll_interval: Duration::from_millis(10),
        mock_payment_delay: Duration::from_millis(20),
    }
}

#[derive(Debug, Default)]
struct ChainState {
    contracts: HashMap<ContractId, HtlcContract>,
    balance: u128,
    withdraw_failures: usize,
    read_failures: usize,
    fail_new_contract: bool,
    next_contract_id: Option<ContractId>,
    withdrawals: Vec<(ContractId, Preimage)>,
    refunds: Vec<ContractId>,
}

/// In-memory HTLC contract.
#[derive(Debug, Default)]
pub struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    /// A funded chain with no contracts.
    pub fn new() -> Self {
        let chain = Self::default();
        lock(&chain.state).balance = MIN_BALANCE_WEI;
        chain
    }

    /// Stores `contract` under `id`.
    pub fn insert(&self, id: ContractId, contract: HtlcContract) {
        lock(&self.state).contracts.insert(id, contract);
    }

    /// Current state of contract `id`.
    pub fn contract(&self, id: &ContractId) -> Option<HtlcContract> {
        lock(&self.state).contracts.get(id).cloned()
    }

    /// Simulates the receiver withdrawing `id` with `preimage`.
    pub fn reveal(&self, id: &ContractId, preimage: Preimage) {
        if let Some(contract) = lock(&self.state).contracts.get_mut(id) {
            contract.withdrawn = true;
            contract.preimage = Some(preimage);
        }
    }

    /// Simulates the sender refunding `id`.
    pub fn mark_refunded(&self, id: &ContractId) {
        if let Some(contract) = lock(&self.state).contracts.get_mut(id) {
            contract.refunded = true;
        }
    }

    /// Makes the next `n` withdrawals fail.
    pub fn fail_withdrawals(&self, n: usize) {
        lock(&self.state).withdraw_failures = n;
    }

    /// Makes the next `n` contract reads fail.
    pub fn fail_contract_reads(&self, n: usize) {
        lock(&self.state).read_failures = n;
    }

    /// Makes contract creation fail.
    pub fn fail_new_contract(&self) {
        lock(&self.state).fail_new_contract = true;
    }

    /// Id returned by the next `new_contract`.
    pub fn set_next_contract_id(&self, id: ContractId) {
        lock(&self.state).next_contract_id = Some(id);
    }

    /// Sets the signer balance in wei.
    pub fn set_balance(&self, wei: u128) {
        lock(&self.state).balance = wei;
    }

    /// Successful withdrawals so far.
    pub fn withdrawals(&self) -> Vec<(ContractId, Preimage)> {
        lock(&self.state).withdrawals.clone()
    }

    /// Refunds submitted so far.
    pub fn refunds(&self) -> Vec<ContractId> {
        lock(&self.state).refunds.clone()
    }
}

#[async_trait]
impl HtlcChain for FakeChain {
    fn signer_address(&self) -> String {
        SIGNER.to_string()
    }

    async fn signer_balance(&self) -> Result<u128, ChainError> {
        Ok(lock(&self.state).balance)
    }

    async fn new_contract(
        &self,
        receiver: &str,
        hashlock: &Hashlock,
        timelock: u64,
        amount: u64,
    ) -> Result<ContractId, ChainError> {
        let mut state = lock(&self.state);
        if state.fail_new_contract {
            return Err(ChainError::Call("execution reverted".to_string()));
        }
        let id = state
            .next_contract_id
            .take()
            .unwrap_or_else(|| ContractId::from_bytes(*hashlock.as_bytes()));
        state.contracts.insert(
            id,
            HtlcContract {
                sender: SIGNER.to_string(),
                receiver: receiver.to_string(),
                amount,
                hashlock: *hashlock,
                timelock,
                withdrawn: false,
                refunded: false,
                preimage: None,
            },
        );
        Ok(id)
    }

    async fn withdraw(
        &self,
        contract_id: &ContractId,
        preimage: &Preimage,
    ) -> Result<String, ChainError> {
        let mut state = lock(&self.state);
        if state.withdraw_failures > 0 {
            state.withdraw_failures -= 1;
            return Err(ChainError::Call("nonce too low".to_string()));
        }
        let Some(contract) = state.contracts.get_mut(contract_id) else {
            return Err(ChainError::Reverted("0xdead".to_string()));
        };
        if !contract.is_open() || preimage.hashlock() != contract.hashlock {
            return Err(ChainError::Reverted("0xdead".to_string()));
        }
        contract.withdrawn = true;
        contract.preimage = Some(*preimage);
        state.withdrawals.push((*contract_id, *preimage));
        Ok("0xwithdraw".to_string())
    }

    async fn refund(&self, contract_id: &ContractId) -> Result<String, ChainError> {
        let mut state = lock(&self.state);
        let Some(contract) = state.contracts.get_mut(contract_id) else {
            return Err(ChainError::Reverted("0xdead".to_string()));
        };
        contract.refunded = true;
        state.refunds.push(*contract_id);
        Ok("0xrefund".to_string())
    }

    async fn have_contract(&self, contract_id: &ContractId) -> Result<bool, ChainError> {
        Ok(lock(&self.state).contracts.contains_key(contract_id))
    }

    async fn get_contract(&self, contract_id: &ContractId) -> Result<HtlcContract, ChainError> {
        let mut state = lock(&self.state);
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(ChainError::Call("connection reset".to_string()));
        }
        state
            .contracts
            .get(contract_id)
            .cloned()
            .ok_or_else(|| ChainError::Call("unknown contract".to_string()))
    }
}

#[derive(Debug, Default)]
struct NodeState {
    decodable: HashMap<String, DecodedInvoice>,
    payable: HashMap<String, Preimage>,
    updates: HashMap<Hashlock, Vec<InvoiceUpdate>>,
    channels: VecDeque<Vec<ChannelBalance>>,
    created: Vec<(u64, u64)>,
    holds: Vec<(Hashlock, u64, u64)>,
    settled: Vec<Preimage>,
    canceled: Vec<Hashlock>,
    payments: Vec<String>,
    refuse_settlement: bool,
    payment_delay: Duration,
}

/// Scripted Lightning node.
#[derive(Debug, Default)]
pub struct FakeLightning {
    state: Mutex<NodeState>,
}

impl FakeLightning {
    /// A node with one funded channel.
    pub fn new() -> Self {
        let node = Self::default();
        node.script_channels(vec![vec![channel(1_000_000, 0, 0)]]);
        node
    }

    /// Makes `invoice.request` decodable.
    pub fn register_invoice(&self, invoice: DecodedInvoice) {
        lock(&self.state)
            .decodable
            .insert(invoice.request.clone(), invoice);
    }

    /// Makes `request` payable, releasing `preimage`.
    pub fn pay_with(&self, request: &str, preimage: Preimage) {
        lock(&self.state)
            .payable
            .insert(request.to_string(), preimage);
    }

    /// Makes paying `request` fail.
    pub fn refuse_payment(&self, request: &str) {
        lock(&self.state).payable.remove(request);
    }

    /// Makes every hold invoice settlement fail.
    pub fn refuse_settlement(&self) {
        lock(&self.state).refuse_settlement = true;
    }

    /// Delays every payment by `delay`.
    pub fn delay_payments(&self, delay: Duration) {
        lock(&self.state).payment_delay = delay;
    }

    /// Updates delivered to subscribers of `id`, after which the
    /// subscription stays open without further updates.
    pub fn script_updates(&self, id: Hashlock, updates: Vec<InvoiceUpdate>) {
        lock(&self.state).updates.insert(id, updates);
    }

    /// Channel balances returned by successive `channels` calls; the last
    /// entry repeats.
    pub fn script_channels(&self, sequence: Vec<Vec<ChannelBalance>>) {
        lock(&self.state).channels = sequence.into();
    }

    /// `(amount, expiry_secs)` of every regular invoice created.
    pub fn created_invoices(&self) -> Vec<(u64, u64)> {
        lock(&self.state).created.clone()
    }

    /// `(hashlock, amount, expiry_secs)` of every hold invoice created.
    pub fn hold_invoices(&self) -> Vec<(Hashlock, u64, u64)> {
        lock(&self.state).holds.clone()
    }

    /// Preimages hold invoices were settled with.
    pub fn settled(&self) -> Vec<Preimage> {
        lock(&self.state).settled.clone()
    }

    /// Hold invoices that were canceled.
    pub fn canceled(&self) -> Vec<Hashlock> {
        lock(&self.state).canceled.clone()
    }

    /// Payment requests the node attempted to pay.
    pub fn payments(&self) -> Vec<String> {
        lock(&self.state).payments.clone()
    }
}

#[async_trait]
impl LightningNode for FakeLightning {
    async fn create_invoice(
        &self,
        amount: u64,
        _memo: &str,
        expiry_secs: u64,
    ) -> Result<CreatedInvoice, LightningError> {
        lock(&self.state).created.push((amount, expiry_secs));
        Ok(CreatedInvoice {
            id: Hashlock::from_bytes(INITIATION_ID),
            request: INITIATION_REQUEST.to_string(),
        })
    }

    async fn create_hold_invoice(
        &self,
        hashlock: &Hashlock,
        amount: u64,
        expiry_secs: u64,
    ) -> Result<CreatedInvoice, LightningError> {
        lock(&self.state).holds.push((*hashlock, amount, expiry_secs));
        Ok(CreatedInvoice {
            id: *hashlock,
            request: HOLD_REQUEST.to_string(),
        })
    }

    async fn subscribe_to_invoice(
        &self,
        id: &Hashlock,
    ) -> Result<InvoiceSubscription, LightningError> {
        let updates = lock(&self.state).updates.get(id).cloned().unwrap_or_default();
        Ok(stream::iter(updates.into_iter().map(Ok))
            .chain(stream::pending())
            .boxed())
    }

    async fn settle_hold_invoice(&self, secret: &Preimage) -> Result<(), LightningError> {
        let mut state = lock(&self.state);
        if state.refuse_settlement {
            return Err(LightningError::Rpc {
                status: 400,
                message: "invoice is already canceled".to_string(),
            });
        }
        state.settled.push(*secret);
        Ok(())
    }

    async fn cancel_hold_invoice(&self, id: &Hashlock) -> Result<(), LightningError> {
        lock(&self.state).canceled.push(*id);
        Ok(())
    }

    async fn pay(&self, request: &str, _max_fee: u64) -> Result<Payment, LightningError> {
        let delay = {
            let mut state = lock(&self.state);
            state.payments.push(request.to_string());
            state.payment_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = lock(&self.state);
        match state.payable.get(request) {
            Some(secret) => Ok(Payment {
                secret: *secret,
                fee: 1,
            }),
            None => Err(LightningError::PaymentFailed("no route".to_string())),
        }
    }

    async fn channels(&self) -> Result<Vec<ChannelBalance>, LightningError> {
        let mut state = lock(&self.state);
        let next = if state.channels.len() > 1 {
            state.channels.pop_front()
        } else {
            state.channels.front().cloned()
        };
        Ok(next.unwrap_or_default())
    }

    fn decode_invoice(&self, request: &str) -> Result<DecodedInvoice, LightningError> {
        lock(&self.state)
            .decodable
            .get(request)
            .cloned()
            .ok_or_else(|| LightningError::InvalidInvoice("unknown test invoice".to_string()))
    }
}

/// One channel's balances.
pub const fn channel(local: u64, remote: u64, unsettled: u64) -> ChannelBalance {
    ChannelBalance {
        local_balance: local,
        remote_balance: remote,
        unsettled_balance: unsettled,
    }
}

/// A halt hook that records violations instead of exiting.
pub fn recording_halt() -> (HaltHook, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let hook: HaltHook = Arc::new(move |e: &SolvencyError| lock(&sink).push(e.to_string()));
    (hook, seen)
}

/// A coordinator wired to fakes and an in-memory ledger.
#[derive(Debug)]
pub struct Harness {
    /// The ledger.
    pub ledger: Arc<MemoryLedger>,
    /// The chain.
    pub chain: Arc<FakeChain>,
    /// The Lightning node.
    pub lightning: Arc<FakeLightning>,
    /// The solvency monitor.
    pub solvency: Arc<SolvencyMonitor>,
    /// The coordinator.
    pub service: Arc<SwapService>,
    /// Violations passed to the halt hook.
    pub halts: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    /// Builds a harness running in `status`.
    pub fn new(status: ServerStatus) -> Self {
        Self::with_timings(status, fast_timings())
    }

    /// Builds a harness running in `status` with custom flow timings.
    pub fn with_timings(status: ServerStatus, timings: FlowTimings) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let chain = Arc::new(FakeChain::new());
        let lightning = Arc::new(FakeLightning::new());
        let (hook, halts) = recording_halt();

        let solvency = Arc::new(
            SolvencyMonitor::new(
                Arc::clone(&ledger) as Arc<dyn Ledger>,
                Arc::clone(&lightning) as Arc<dyn LightningNode>,
                &timings,
            )
            .with_halt_hook(hook),
        );
        let service = Arc::new(SwapService::new(
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            Arc::clone(&chain) as Arc<dyn HtlcChain>,
            Arc::clone(&lightning) as Arc<dyn LightningNode>,
            Arc::clone(&solvency),
            SwapSettings {
                status,
                provider: ProviderConfig::default(),
                timings,
                signer_min_balance_wei: MIN_BALANCE_WEI,
            },
        ));

        Self {
            ledger,
            chain,
            lightning,
            solvency,
            service,
            halts,
        }
    }

    /// Violations recorded so far.
    pub fn halts(&self) -> Vec<String> {
        lock(&self.halts).clone()
    }

    /// Stores an open contract payable to the bridge and a matching
    /// decodable, payable invoice. Returns the invoice request.
    pub fn fund_send(&self, contract_id: ContractId, preimage: Preimage, amount: u64) -> String {
        let now = unix_now();
        let request = format!("lnbc-{contract_id}");
        self.chain.insert(
            contract_id,
            HtlcContract {
                sender: USER.to_string(),
                receiver: SIGNER.to_string(),
                amount,
                hashlock: preimage.hashlock(),
                timelock: now + 7_200,
                withdrawn: false,
                refunded: false,
                preimage: None,
            },
        );
        self.lightning.register_invoice(DecodedInvoice {
            request: request.clone(),
            payment_hash: preimage.hashlock(),
            amount_msat: Some(amount * 1_000),
            timestamp: now,
            expires_at: now + 600,
        });
        self.lightning.pay_with(&request, preimage);
        request
    }
}

/// Receives the next reply, failing the test after one second.
pub async fn next_reply(rx: &mut mpsc::UnboundedReceiver<SwapReply>) -> SwapReply {
    match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(reply)) => reply,
        Ok(None) => panic!("reply channel closed"),
        Err(_) => panic!("timed out waiting for a reply"),
    }
}

/// Drains every reply already queued.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SwapReply>) -> Vec<SwapReply> {
    let mut out = Vec::new();
    while let Ok(reply) = rx.try_recv() {
        out.push(reply);
    }
    out
}

/// A fresh reply queue.
pub fn replies() -> (Replies, mpsc::UnboundedReceiver<SwapReply>) {
    Replies::channel()
}
