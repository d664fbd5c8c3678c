//! # Billing store
//!
//! Persistence layer for accounts, API keys, usage records, and the balance
//! ledger. Two repositories implement the [`BillingStore`] trait: SQLite for
//! single-node deployments and tests, Postgres for shared deployments.
//!
//! ## The debit transaction
//!
//! [`BillingStore::charge_completion`] is the system's only atomicity
//! contract. One transaction: re-read the account balance under an exclusive
//! lock, verify the debit keeps it non-negative, apply the debit and bump the
//! aggregate counters, append one usage record and one ledger entry, commit.
//! Any failure rolls the whole attempt back. The account lock is the sole
//! concurrency primitive (no in-process mutex or queue), so concurrent debits
//! against one account serialize at lock acquisition while different accounts
//! proceed in parallel.

pub mod error;
pub mod postgres;
pub mod records;
pub mod sqlite;

pub use error::StoreError;
pub use postgres::PgStore;
pub use records::{
    Account, ApiKeyRecord, CallerIdentity, ChargeReceipt, CompletionCharge, LedgerEntry,
    LedgerKind, UsageRecord,
};
pub use sqlite::SqliteStore;

use crate::config::DatabaseConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence contract consumed by the request handlers.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Create an account with an opening balance. A non-zero opening balance
    /// is recorded as a bonus ledger entry.
    async fn create_account(
        &self,
        name: &str,
        email: &str,
        opening_balance: f64,
    ) -> Result<Account, StoreError>;

    /// Bind a new API key secret to an account.
    async fn create_api_key(
        &self,
        account_id: i64,
        secret: &str,
    ) -> Result<ApiKeyRecord, StoreError>;

    /// Revoke a key (soft delete; the row stays for attribution).
    async fn deactivate_api_key(&self, api_key_id: i64) -> Result<(), StoreError>;

    /// Resolve a bearer secret to a caller identity with a balance snapshot.
    /// Inactive and unknown keys resolve to `None`. Touches `last_used_at`.
    async fn resolve_api_key(&self, secret: &str) -> Result<Option<CallerIdentity>, StoreError>;

    /// The locked debit transaction described in the module docs.
    async fn charge_completion(
        &self,
        charge: &CompletionCharge,
    ) -> Result<ChargeReceipt, StoreError>;

    /// Apply a deposit, refund, or bonus under the same locked-transaction
    /// discipline, appending the corresponding ledger entry.
    async fn credit(
        &self,
        account_id: i64,
        kind: LedgerKind,
        amount: f64,
        description: &str,
        reference: Option<&str>,
    ) -> Result<LedgerEntry, StoreError>;

    /// Fetch an account row.
    async fn account(&self, account_id: i64) -> Result<Account, StoreError>;

    /// Ledger entries for an account, newest first.
    async fn ledger_entries(&self, account_id: i64) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Usage records for an account, newest first.
    async fn usage_records(&self, account_id: i64) -> Result<Vec<UsageRecord>, StoreError>;
}

/// Connect to the store selected by the database URL scheme and run
/// migrations.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn BillingStore>, StoreError> {
    if config.url.starts_with("sqlite:") {
        let store = SqliteStore::connect(&config.url, config.max_connections).await?;
        Ok(Arc::new(store))
    } else if config.url.starts_with("postgres:") || config.url.starts_with("postgresql:") {
        let store = PgStore::connect(&config.url, config.max_connections).await?;
        Ok(Arc::new(store))
    } else {
        Err(StoreError::UnsupportedUrl(config.url.clone()))
    }
}
