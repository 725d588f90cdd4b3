//! End-to-end flows: engine -> gateway -> reconciler -> ledger
//!
//! Exercises the full settlement cycle including duplicate callback
//! deliveries and signature enforcement.

use ledger_core::{Config, Ledger, TransactionStatus, UserId};
use rust_decimal_macros::dec;
use settlement::{
    signature, Error, MockGateway, ReconcileOutcome, Reconciler, SavingsEngine,
};
use std::collections::HashMap;
use std::sync::Arc;

async fn open_test_ledger() -> Arc<Ledger> {
    // A subscriber may already be installed by another test; ignore that
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .try_init();

    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    std::mem::forget(temp_dir);

    Arc::new(Ledger::open(config).await.unwrap())
}

/// Fund an account through a full deposit/settlement cycle
async fn fund(engine: &SavingsEngine, reconciler: &Reconciler, user: &UserId, amount: &str) {
    let receipt = engine
        .deposit(user, amount.parse().unwrap(), "254712345678")
        .await
        .unwrap();
    let body = format!(
        r#"{{"reference":"{}","success":true}}"#,
        receipt.provider_reference
    );
    reconciler
        .apply(body.as_bytes(), &HashMap::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_lock_and_early_unlock_scenario() {
    let ledger = open_test_ledger().await;
    let engine = SavingsEngine::new(ledger.clone(), Arc::new(MockGateway::new()));
    let reconciler = Reconciler::new(ledger.clone(), None);

    let user = UserId::new("user-1");
    ledger.create_account(user.clone()).await.unwrap();
    fund(&engine, &reconciler, &user, "1000.00").await;

    // Lock 500 for 30 days: balance 500, one active lock
    let lock = ledger
        .create_lock(user.clone(), dec!(500.00), 30)
        .await
        .unwrap();
    let view = ledger.get_balance(user.clone()).await.unwrap();
    assert_eq!(view.total, dec!(500.00));
    assert_eq!(view.locked, dec!(500.00));

    // Early unlock at 10%: penalty 50, returned 450, balance 950
    let receipt = ledger.unlock_early(user.clone(), lock.id).await.unwrap();
    assert_eq!(receipt.penalty, dec!(50.00));
    assert_eq!(receipt.amount_returned, dec!(450.00));
    assert_eq!(receipt.new_balance, dec!(950.00));
}

#[tokio::test]
async fn test_withdrawal_settlement_and_duplicate_delivery() {
    let ledger = open_test_ledger().await;
    let engine = SavingsEngine::new(ledger.clone(), Arc::new(MockGateway::new()));
    let reconciler = Reconciler::new(ledger.clone(), None);

    let user = UserId::new("user-1");
    ledger.create_account(user.clone()).await.unwrap();
    fund(&engine, &reconciler, &user, "950.00").await;

    // Withdraw 200 to M-Pesa: pending transaction with a provider reference
    let receipt = engine
        .withdraw(&user, dec!(200.00), "254712345678", "63902")
        .await
        .unwrap();

    let tx = ledger
        .get_transaction(user.clone(), receipt.transaction_id)
        .await
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);

    // Pending withdrawal has not debited yet
    let view = ledger.get_balance(user.clone()).await.unwrap();
    assert_eq!(view.total, dec!(950.00));

    // Gateway confirms: transaction success, balance 750
    let body = format!(
        r#"{{"reference":"{}","success":true,"result_desc":"Processed"}}"#,
        receipt.provider_reference
    );
    let outcome = reconciler
        .apply(body.as_bytes(), &HashMap::new())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Applied {
            status: TransactionStatus::Success,
            ..
        }
    ));

    let view = ledger.get_balance(user.clone()).await.unwrap();
    assert_eq!(view.total, dec!(750.00));

    // The gateway retries delivery: no-op, still 750, reported as success
    let outcome = reconciler
        .apply(body.as_bytes(), &HashMap::new())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::AlreadyProcessed {
            status: TransactionStatus::Success,
            ..
        }
    ));

    let view = ledger.get_balance(user.clone()).await.unwrap();
    assert_eq!(view.total, dec!(750.00));

    // The stored row kept the raw payload
    let tx = ledger
        .get_transaction(user, receipt.transaction_id)
        .await
        .unwrap();
    assert_eq!(tx.callback_payload.as_deref(), Some(body.as_str()));
    assert_eq!(tx.result_description.as_deref(), Some("Processed"));
}

#[tokio::test]
async fn test_invalid_lock_duration_is_client_visible() {
    let ledger = open_test_ledger().await;
    let engine = SavingsEngine::new(ledger.clone(), Arc::new(MockGateway::new()));
    let reconciler = Reconciler::new(ledger.clone(), None);

    let user = UserId::new("user-1");
    ledger.create_account(user.clone()).await.unwrap();
    fund(&engine, &reconciler, &user, "100.00").await;

    let err = ledger
        .create_lock(user, dec!(50.00), 45)
        .await
        .expect_err("45 days is not a valid duration");
    match err {
        ledger_core::Error::Validation(msg) => {
            assert!(msg.contains("30, 60, 90, 180, or 365"));
        }
        other => panic!("expected validation error, got {}", other),
    }
}

#[tokio::test]
async fn test_failed_callback_keeps_balance() {
    let ledger = open_test_ledger().await;
    let engine = SavingsEngine::new(ledger.clone(), Arc::new(MockGateway::new()));
    let reconciler = Reconciler::new(ledger.clone(), None);

    let user = UserId::new("user-1");
    ledger.create_account(user.clone()).await.unwrap();
    fund(&engine, &reconciler, &user, "500.00").await;

    let receipt = engine
        .withdraw(&user, dec!(300.00), "254712345678", "63903")
        .await
        .unwrap();

    // Gateway reports failure via result_code
    let body = format!(
        r#"{{"reference":"{}","result_code":1037,"result_desc":"Timeout in completing transaction"}}"#,
        receipt.provider_reference
    );
    let outcome = reconciler
        .apply(body.as_bytes(), &HashMap::new())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Applied {
            status: TransactionStatus::Failed,
            ..
        }
    ));

    // A pending withdrawal never touched the balance, so nothing to reverse
    let view = ledger.get_balance(user).await.unwrap();
    assert_eq!(view.total, dec!(500.00));
}

#[tokio::test]
async fn test_signed_callback_cycle() {
    let ledger = open_test_ledger().await;
    let engine = SavingsEngine::new(ledger.clone(), Arc::new(MockGateway::new()));
    let secret = "webhook-secret";
    let reconciler = Reconciler::new(ledger.clone(), Some(secret.to_string()));

    let user = UserId::new("user-1");
    ledger.create_account(user.clone()).await.unwrap();

    let receipt = engine
        .deposit(&user, dec!(120.00), "254798765432")
        .await
        .unwrap();
    let body = format!(
        r#"{{"reference":"{}","status":"SUCCESS"}}"#,
        receipt.provider_reference
    );

    // Unsigned delivery is rejected outright
    let result = reconciler.apply(body.as_bytes(), &HashMap::new()).await;
    assert!(matches!(result, Err(Error::Unauthenticated(_))));

    // Tampered signature is rejected
    let mut headers = HashMap::new();
    headers.insert(
        "x-signature".to_string(),
        signature::sign(body.as_bytes(), "wrong-secret"),
    );
    let result = reconciler.apply(body.as_bytes(), &headers).await;
    assert!(matches!(result, Err(Error::Unauthenticated(_))));

    // Nothing was applied while unauthenticated
    let view = ledger.get_balance(user.clone()).await.unwrap();
    assert_eq!(view.total, dec!(0.00));

    // Properly signed delivery settles the deposit
    let mut headers = HashMap::new();
    headers.insert(
        "x-gateway-signature".to_string(),
        signature::sign(body.as_bytes(), secret),
    );
    reconciler.apply(body.as_bytes(), &headers).await.unwrap();

    let view = ledger.get_balance(user).await.unwrap();
    assert_eq!(view.total, dec!(120.00));
}

#[tokio::test]
async fn test_out_of_order_callbacks_settle_independently() {
    let ledger = open_test_ledger().await;
    let engine = SavingsEngine::new(ledger.clone(), Arc::new(MockGateway::new()));
    let reconciler = Reconciler::new(ledger.clone(), None);

    let user = UserId::new("user-1");
    ledger.create_account(user.clone()).await.unwrap();

    // Two deposits initiated in order, settled in reverse
    let first = engine
        .deposit(&user, dec!(10.00), "254712345678")
        .await
        .unwrap();
    let second = engine
        .deposit(&user, dec!(25.00), "254712345678")
        .await
        .unwrap();

    for reference in [&second.provider_reference, &first.provider_reference] {
        let body = format!(r#"{{"reference":"{}","success":true}}"#, reference);
        reconciler
            .apply(body.as_bytes(), &HashMap::new())
            .await
            .unwrap();
    }

    let view = ledger.get_balance(user).await.unwrap();
    assert_eq!(view.total, dec!(35.00));
}

#[tokio::test]
async fn test_insufficient_funds_reports_available() {
    let ledger = open_test_ledger().await;
    let engine = SavingsEngine::new(ledger.clone(), Arc::new(MockGateway::new()));
    let reconciler = Reconciler::new(ledger.clone(), None);

    let user = UserId::new("user-1");
    ledger.create_account(user.clone()).await.unwrap();
    fund(&engine, &reconciler, &user, "100.00").await;
    ledger
        .create_lock(user.clone(), dec!(40.00), 60)
        .await
        .unwrap();

    // Balance 60 with 40 still locked leaves 20 available
    let view = ledger.get_balance(user.clone()).await.unwrap();
    assert_eq!(view.available, dec!(20.00));

    let result = engine
        .withdraw(&user, dec!(50.00), "254712345678", "63902")
        .await;
    assert!(matches!(
        result,
        Err(Error::Ledger(ledger_core::Error::InsufficientFunds { available }))
            if available == dec!(20.00)
    ));
}
