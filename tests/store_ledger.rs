//! Billing store invariants: the locked debit transaction, ledger
//! consistency, and serialization of concurrent charges.

use aigate::store::{
    BillingStore, CompletionCharge, LedgerKind, SqliteStore, StoreError,
};
use std::sync::Arc;

async fn memory_store() -> SqliteStore {
    SqliteStore::connect("sqlite::memory:", 1).await.unwrap()
}

fn charge(account_id: i64, api_key_id: i64, cost: f64) -> CompletionCharge {
    CompletionCharge {
        account_id,
        api_key_id,
        model: "gpt-4o-mini".to_string(),
        endpoint: "/v1/chat/completions".to_string(),
        input_tokens: 1000,
        output_tokens: 500,
        cost,
        duration_ms: 250,
        client_addr: Some("203.0.113.7".to_string()),
    }
}

#[tokio::test]
async fn test_charge_updates_balance_and_counters() {
    let store = memory_store().await;
    let account = store
        .create_account("Dias", "d@example.com", 10.0)
        .await
        .unwrap();
    let key = store.create_api_key(account.id, "sk-1").await.unwrap();

    let receipt = store
        .charge_completion(&charge(account.id, key.id, 0.081))
        .await
        .unwrap();

    assert_eq!(receipt.cost, 0.081);
    assert_eq!(receipt.balance_before, 10.0);
    assert_eq!(receipt.balance_after, 9.919);

    let account = store.account(account.id).await.unwrap();
    assert_eq!(account.balance, 9.919);
    assert_eq!(account.total_requests, 1);
    assert_eq!(account.total_tokens, 1500);
    assert!((account.total_cost - 0.081).abs() < 1e-9);
}

#[tokio::test]
async fn test_charge_writes_usage_and_ledger_rows() {
    let store = memory_store().await;
    let account = store
        .create_account("Dias", "d@example.com", 10.0)
        .await
        .unwrap();
    let key = store.create_api_key(account.id, "sk-1").await.unwrap();

    store
        .charge_completion(&charge(account.id, key.id, 0.081))
        .await
        .unwrap();

    let usage = store.usage_records(account.id).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].api_key_id, key.id);
    assert_eq!(usage[0].total_tokens, 1500);
    assert_eq!(usage[0].client_addr.as_deref(), Some("203.0.113.7"));

    let ledger = store.ledger_entries(account.id).await.unwrap();
    let debit = ledger
        .iter()
        .find(|e| e.kind == LedgerKind::Usage)
        .unwrap();
    assert_eq!(debit.amount, 0.081);
    assert_eq!(debit.balance_after, debit.balance_before - debit.amount);
    assert_eq!(debit.description, "API request - gpt-4o-mini (1500 tokens)");
}

#[tokio::test]
async fn test_overdraft_rolls_back_whole_transaction() {
    let store = memory_store().await;
    let account = store
        .create_account("Dias", "d@example.com", 0.05)
        .await
        .unwrap();
    let key = store.create_api_key(account.id, "sk-1").await.unwrap();

    let result = store
        .charge_completion(&charge(account.id, key.id, 0.081))
        .await;

    match result {
        Err(StoreError::InsufficientBalance { required, current }) => {
            assert_eq!(required, 0.081);
            assert_eq!(current, 0.05);
        }
        other => panic!("expected InsufficientBalance, got {other:?}"),
    }

    // No partial writes survive the rollback
    let account = store.account(account.id).await.unwrap();
    assert_eq!(account.balance, 0.05);
    assert_eq!(account.total_requests, 0);
    assert!(store.usage_records(account.id).await.unwrap().is_empty());
    let ledger = store.ledger_entries(account.id).await.unwrap();
    assert!(ledger.iter().all(|e| e.kind != LedgerKind::Usage));
}

#[tokio::test]
async fn test_charge_unknown_account() {
    let store = memory_store().await;
    let result = store.charge_completion(&charge(99, 1, 0.01)).await;
    assert!(matches!(result, Err(StoreError::AccountNotFound(99))));
}

#[tokio::test]
async fn test_exact_balance_charge_reaches_zero() {
    let store = memory_store().await;
    let account = store
        .create_account("Dias", "d@example.com", 0.081)
        .await
        .unwrap();
    let key = store.create_api_key(account.id, "sk-1").await.unwrap();

    let receipt = store
        .charge_completion(&charge(account.id, key.id, 0.081))
        .await
        .unwrap();
    assert_eq!(receipt.balance_after, 0.0);
}

#[tokio::test]
async fn test_cost_rounded_to_four_decimals() {
    let store = memory_store().await;
    let account = store
        .create_account("Dias", "d@example.com", 10.0)
        .await
        .unwrap();
    let key = store.create_api_key(account.id, "sk-1").await.unwrap();

    let receipt = store
        .charge_completion(&charge(account.id, key.id, 0.08149))
        .await
        .unwrap();
    assert_eq!(receipt.cost, 0.0815);
    assert_eq!(receipt.balance_after, 9.9185);
}

#[tokio::test]
async fn test_credit_kinds_recorded() {
    let store = memory_store().await;
    let account = store
        .create_account("Dias", "d@example.com", 0.0)
        .await
        .unwrap();

    let deposit = store
        .credit(
            account.id,
            LedgerKind::Deposit,
            500.0,
            "Card payment",
            Some("pay-123"),
        )
        .await
        .unwrap();
    assert_eq!(deposit.balance_before, 0.0);
    assert_eq!(deposit.balance_after, 500.0);
    assert_eq!(deposit.reference.as_deref(), Some("pay-123"));

    let refund = store
        .credit(account.id, LedgerKind::Refund, 25.0, "Failed request", None)
        .await
        .unwrap();
    assert_eq!(refund.balance_after, 525.0);

    let account = store.account(account.id).await.unwrap();
    assert_eq!(account.balance, 525.0);
}

#[tokio::test]
async fn test_ledger_chain_consistent_across_mixed_activity() {
    let store = memory_store().await;
    let account = store
        .create_account("Dias", "d@example.com", 100.0)
        .await
        .unwrap();
    let key = store.create_api_key(account.id, "sk-1").await.unwrap();

    store
        .charge_completion(&charge(account.id, key.id, 0.081))
        .await
        .unwrap();
    store
        .credit(account.id, LedgerKind::Deposit, 50.0, "Top up", None)
        .await
        .unwrap();
    store
        .charge_completion(&charge(account.id, key.id, 1.5))
        .await
        .unwrap();

    let mut ledger = store.ledger_entries(account.id).await.unwrap();
    ledger.reverse(); // oldest first

    for entry in &ledger {
        let expected = if entry.kind.is_debit() {
            entry.balance_before - entry.amount
        } else {
            entry.balance_before + entry.amount
        };
        assert!((entry.balance_after - expected).abs() < 1e-9);
    }

    // Each entry's balance_before matches the previous entry's balance_after
    for pair in ledger.windows(2) {
        assert!((pair[1].balance_before - pair[0].balance_after).abs() < 1e-9);
    }

    let account = store.account(account.id).await.unwrap();
    assert!((account.balance - ledger.last().unwrap().balance_after).abs() < 1e-9);
}

#[tokio::test]
async fn test_concurrent_charges_serialize_on_account_lock() {
    // File-backed database so separate pool connections share state
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("billing.db").display());
    let store = Arc::new(SqliteStore::connect(&url, 5).await.unwrap());

    let account = store
        .create_account("Dias", "d@example.com", 100.0)
        .await
        .unwrap();
    let key = store.create_api_key(account.id, "sk-1").await.unwrap();

    // Two charges of 60 ₸ against 100 ₸: exactly one can commit
    let store_a = Arc::clone(&store);
    let store_b = Arc::clone(&store);
    let charge_a = charge(account.id, key.id, 60.0);
    let charge_b = charge(account.id, key.id, 60.0);

    let (result_a, result_b) = tokio::join!(
        tokio::spawn(async move { store_a.charge_completion(&charge_a).await }),
        tokio::spawn(async move { store_b.charge_completion(&charge_b).await }),
    );
    let result_a = result_a.unwrap();
    let result_b = result_b.unwrap();

    let successes = [&result_a, &result_b]
        .iter()
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(successes, 1, "exactly one concurrent charge may commit");

    let failure = if result_a.is_err() { result_a } else { result_b };
    assert!(matches!(
        failure,
        Err(StoreError::InsufficientBalance { .. })
    ));

    let account = store.account(account.id).await.unwrap();
    assert_eq!(account.balance, 40.0);
    assert_eq!(account.total_requests, 1);
    assert_eq!(store.usage_records(account.id).await.unwrap().len(), 1);
}
