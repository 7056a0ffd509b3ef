//! Cached-payment recovery job.

#![allow(clippy::panic)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use lightning_evm_bridge::chain::HtlcChain;
use lightning_evm_bridge::domain::{
    CachedPayment, ContractId, EventBus, NewTransaction, Preimage, TransactionStatus,
    TransactionType,
};
use lightning_evm_bridge::persistence::Ledger;
use lightning_evm_bridge::service::{CachedPaymentRecovery, RecoveryReport, ServerStatus};
use support::{Harness, MIN_BALANCE_WEI, USER};

async fn seed_cached(h: &Harness, id: ContractId, secret: Preimage) {
    let request = h.fund_send(id, secret, 2_000);
    let Ok(_) = h
        .ledger
        .create_transaction(NewTransaction {
            status: TransactionStatus::Pending,
            amount: 2_000,
            tx_hash: String::new(),
            contract_id: id,
            hash_lock_timestamp: 0,
            ln_invoice: request,
            user_address: USER.to_string(),
            transaction_type: TransactionType::Sent,
        })
        .await
    else {
        panic!("pending transaction should be stored");
    };
    let Ok(true) = h
        .ledger
        .cache_payment(&CachedPayment {
            contract_id: id,
            secret,
            required_balance: Some(MIN_BALANCE_WEI),
        })
        .await
    else {
        panic!("payment should be cached");
    };
}

fn recovery(h: &Harness, bus: &EventBus) -> CachedPaymentRecovery {
    CachedPaymentRecovery::new(
        Arc::clone(&h.ledger) as Arc<dyn Ledger>,
        Arc::clone(&h.chain) as Arc<dyn HtlcChain>,
        Arc::clone(&h.solvency),
        bus.clone(),
        Duration::from_millis(10),
    )
}

async fn status_of(h: &Harness, id: &ContractId) -> TransactionStatus {
    match h.ledger.find_transaction(id).await {
        Ok(Some(tx)) => tx.status,
        other => panic!("transaction lookup failed: {other:?}"),
    }
}

#[tokio::test]
async fn nothing_cached_is_a_no_op() {
    let h = Harness::new(ServerStatus::Active);
    let report = recovery(&h, &EventBus::new(4)).tick().await;
    assert_eq!(report, RecoveryReport::default());
}

#[tokio::test]
async fn underfunded_signer_defers_until_topped_up() {
    let h = Harness::new(ServerStatus::Active);
    let id = ContractId::from_bytes([0x71; 32]);
    let secret = Preimage::from_bytes([0x17; 32]);
    seed_cached(&h, id, secret).await;
    let job = recovery(&h, &EventBus::new(4));

    h.chain.set_balance(MIN_BALANCE_WEI - 1);
    let report = job.tick().await;
    assert_eq!(report.skipped, 1);
    assert_eq!(report.settled, 0);
    assert_eq!(status_of(&h, &id).await, TransactionStatus::Cached);
    assert!(h.chain.withdrawals().is_empty());

    h.chain.set_balance(MIN_BALANCE_WEI);
    let report = job.tick().await;
    assert_eq!(report.settled, 1);
    assert_eq!(status_of(&h, &id).await, TransactionStatus::Completed);
    assert_eq!(h.chain.withdrawals(), vec![(id, secret)]);
}

#[tokio::test]
async fn failing_withdrawal_stays_cached() {
    let h = Harness::new(ServerStatus::Active);
    let id = ContractId::from_bytes([0x72; 32]);
    seed_cached(&h, id, Preimage::from_bytes([0x18; 32])).await;
    h.chain.fail_withdrawals(2);
    let job = recovery(&h, &EventBus::new(4));

    for _ in 0..2 {
        let report = job.tick().await;
        assert_eq!((report.attempted, report.settled), (1, 0));
        assert_eq!(status_of(&h, &id).await, TransactionStatus::Cached);
    }
    assert_eq!(job.tick().await.settled, 1);
    assert_eq!(status_of(&h, &id).await, TransactionStatus::Completed);
}

#[tokio::test]
async fn contract_withdrawn_elsewhere_settles_ledger_only() {
    let h = Harness::new(ServerStatus::Active);
    let id = ContractId::from_bytes([0x73; 32]);
    let secret = Preimage::from_bytes([0x19; 32]);
    seed_cached(&h, id, secret).await;
    h.chain.reveal(&id, secret);

    let report = recovery(&h, &EventBus::new(4)).tick().await;
    assert_eq!(report.settled, 1);
    assert_eq!(status_of(&h, &id).await, TransactionStatus::Completed);
    assert!(h.chain.withdrawals().is_empty());
}

#[tokio::test]
async fn background_job_settles_on_its_own() {
    let h = Harness::new(ServerStatus::Active);
    let id = ContractId::from_bytes([0x74; 32]);
    seed_cached(&h, id, Preimage::from_bytes([0x1a; 32])).await;
    let bus = EventBus::new(4);
    let mut events = bus.subscribe();

    let handle = tokio::spawn(Arc::new(recovery(&h, &bus)).run());
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv()).await;
    handle.abort();

    let Ok(Ok(event)) = event else {
        panic!("recovery should publish a settlement");
    };
    assert_eq!(event.contract_id(), id);
    assert_eq!(status_of(&h, &id).await, TransactionStatus::Completed);
}
