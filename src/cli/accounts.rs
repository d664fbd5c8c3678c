//! Account management command handlers
//!
//! Thin wrappers over the billing store for operators: create an account
//! with its first API key, credit a balance, inspect a ledger.

use crate::cli::{AccountsCreateArgs, AccountsShowArgs, AccountsTopupArgs};
use crate::config::AigateConfig;
use crate::store::{self, BillingStore, LedgerKind};
use std::path::Path;
use std::sync::Arc;

async fn open_store(
    config_path: &Path,
) -> Result<Arc<dyn BillingStore>, Box<dyn std::error::Error>> {
    let config = if config_path.exists() {
        AigateConfig::load(Some(config_path))?
    } else {
        AigateConfig::default()
    };
    let config = config.with_env_overrides();
    Ok(store::connect(&config.database).await?)
}

/// Handle `aigate accounts create`
pub async fn handle_accounts_create(
    args: &AccountsCreateArgs,
) -> Result<String, Box<dyn std::error::Error>> {
    let store = open_store(&args.config).await?;

    let account = store
        .create_account(&args.name, &args.email, args.balance)
        .await?;
    let secret = format!("sk-aigate-{}", uuid::Uuid::new_v4().simple());
    store.create_api_key(account.id, &secret).await?;

    Ok(format!(
        "✓ Account {} created for {} <{}>\n  Balance: {:.2} ₸\n  API key: {}",
        account.id, account.name, account.email, account.balance, secret
    ))
}

/// Handle `aigate accounts topup`
pub async fn handle_accounts_topup(
    args: &AccountsTopupArgs,
) -> Result<String, Box<dyn std::error::Error>> {
    let store = open_store(&args.config).await?;

    let entry = store
        .credit(
            args.account_id,
            LedgerKind::Deposit,
            args.amount,
            &args.description,
            args.reference.as_deref(),
        )
        .await?;

    Ok(format!(
        "✓ Account {} credited {:.2} ₸ ({:.2} ₸ -> {:.2} ₸)",
        args.account_id, entry.amount, entry.balance_before, entry.balance_after
    ))
}

/// Handle `aigate accounts show`
pub async fn handle_accounts_show(
    args: &AccountsShowArgs,
) -> Result<String, Box<dyn std::error::Error>> {
    let store = open_store(&args.config).await?;

    let account = store.account(args.account_id).await?;
    let ledger = store.ledger_entries(args.account_id).await?;

    if args.json {
        let value = serde_json::json!({
            "account": account,
            "ledger": ledger,
        });
        return Ok(serde_json::to_string_pretty(&value)?);
    }

    let mut out = format!(
        "Account {}: {} <{}>\n  Balance: {:.2} ₸\n  Requests: {}  Tokens: {}  Spent: {:.2} ₸\n",
        account.id,
        account.name,
        account.email,
        account.balance,
        account.total_requests,
        account.total_tokens,
        account.total_cost,
    );

    if ledger.is_empty() {
        out.push_str("  No ledger entries\n");
    } else {
        out.push_str("  Recent ledger:\n");
        for entry in ledger.iter().take(10) {
            out.push_str(&format!(
                "    [{}] {:<8} {:>10.4} ₸  {:.2} -> {:.2}  {}\n",
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                entry.kind.as_str(),
                entry.amount,
                entry.balance_before,
                entry.balance_after,
                entry.description,
            ));
        }
    }

    Ok(out)
}
