//! SQLite-backed billing store
//!
//! Default store for single-node deployments and the test suite. SQLite has
//! no `SELECT ... FOR UPDATE`; each mutating transaction acquires the write
//! lock up front with a no-op account update, which serializes concurrent
//! debits exactly like the Postgres row lock does.

use super::error::StoreError;
use super::records::{
    Account, ApiKeyRecord, CallerIdentity, ChargeReceipt, CompletionCharge, LedgerEntry,
    LedgerKind, UsageRecord,
};
use super::BillingStore;
use crate::billing::round_money;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// How long a transaction waits on the database write lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        balance REAL NOT NULL DEFAULT 0,
        total_requests INTEGER NOT NULL DEFAULT 0,
        total_tokens INTEGER NOT NULL DEFAULT 0,
        total_cost REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS api_keys (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        secret TEXT NOT NULL UNIQUE,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        last_used_at TEXT,
        request_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS usage_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        api_key_id INTEGER NOT NULL REFERENCES api_keys(id),
        model TEXT NOT NULL,
        endpoint TEXT NOT NULL,
        input_tokens INTEGER NOT NULL,
        output_tokens INTEGER NOT NULL,
        total_tokens INTEGER NOT NULL,
        cost REAL NOT NULL,
        duration_ms INTEGER NOT NULL,
        client_addr TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS ledger_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id),
        kind TEXT NOT NULL,
        amount REAL NOT NULL,
        balance_before REAL NOT NULL,
        balance_after REAL NOT NULL,
        description TEXT NOT NULL,
        reference TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_usage_account ON usage_records(account_id)",
    "CREATE INDEX IF NOT EXISTS idx_ledger_account ON ledger_entries(account_id)",
];

/// SQLite repository implementing [`BillingStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing), configure, and migrate the database.
    ///
    /// In-memory databases are pinned to a single pooled connection; separate
    /// connections would each see their own empty database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections })
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn account_from_row(row: &sqlx::sqlite::SqliteRow) -> Account {
        Account {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            balance: row.get("balance"),
            total_requests: row.get("total_requests"),
            total_tokens: row.get("total_tokens"),
            total_cost: row.get("total_cost"),
            created_at: row.get("created_at"),
        }
    }

    fn ledger_from_row(row: &sqlx::sqlite::SqliteRow) -> LedgerEntry {
        let kind: String = row.get("kind");
        LedgerEntry {
            id: row.get("id"),
            account_id: row.get("account_id"),
            kind: LedgerKind::parse(&kind).unwrap_or(LedgerKind::Usage),
            amount: row.get("amount"),
            balance_before: row.get("balance_before"),
            balance_after: row.get("balance_after"),
            description: row.get("description"),
            reference: row.get("reference"),
            created_at: row.get("created_at"),
        }
    }

    fn usage_from_row(row: &sqlx::sqlite::SqliteRow) -> UsageRecord {
        UsageRecord {
            id: row.get("id"),
            account_id: row.get("account_id"),
            api_key_id: row.get("api_key_id"),
            model: row.get("model"),
            endpoint: row.get("endpoint"),
            input_tokens: row.get("input_tokens"),
            output_tokens: row.get("output_tokens"),
            total_tokens: row.get("total_tokens"),
            cost: row.get("cost"),
            duration_ms: row.get("duration_ms"),
            client_addr: row.get("client_addr"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl BillingStore for SqliteStore {
    async fn create_account(
        &self,
        name: &str,
        email: &str,
        opening_balance: f64,
    ) -> Result<Account, StoreError> {
        let opening = round_money(opening_balance);
        if opening < 0.0 {
            return Err(StoreError::InvalidCredit(
                "opening balance cannot be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO accounts (name, email, balance, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(email)
        .bind(opening)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let account_id = result.last_insert_rowid();

        if opening > 0.0 {
            sqlx::query(
                "INSERT INTO ledger_entries \
                 (account_id, kind, amount, balance_before, balance_after, description, created_at) \
                 VALUES (?, 'bonus', ?, 0, ?, 'Opening balance', ?)",
            )
            .bind(account_id)
            .bind(opening)
            .bind(opening)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Account {
            id: account_id,
            name: name.to_string(),
            email: email.to_string(),
            balance: opening,
            total_requests: 0,
            total_tokens: 0,
            total_cost: 0.0,
            created_at: now,
        })
    }

    async fn create_api_key(
        &self,
        account_id: i64,
        secret: &str,
    ) -> Result<ApiKeyRecord, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO api_keys (account_id, secret, is_active, created_at) VALUES (?, ?, 1, ?)",
        )
        .bind(account_id)
        .bind(secret)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(ApiKeyRecord {
            id: result.last_insert_rowid(),
            account_id,
            secret: secret.to_string(),
            is_active: true,
            created_at: now,
            last_used_at: None,
            request_count: 0,
        })
    }

    async fn deactivate_api_key(&self, api_key_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE api_keys SET is_active = 0 WHERE id = ?")
            .bind(api_key_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn resolve_api_key(&self, secret: &str) -> Result<Option<CallerIdentity>, StoreError> {
        let row = sqlx::query(
            "SELECT k.id AS api_key_id, k.account_id, a.balance \
             FROM api_keys k JOIN accounts a ON a.id = k.account_id \
             WHERE k.secret = ? AND k.is_active = 1",
        )
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let identity = CallerIdentity {
            account_id: row.get("account_id"),
            api_key_id: row.get("api_key_id"),
            balance: row.get("balance"),
        };

        sqlx::query(
            "UPDATE api_keys SET last_used_at = ?, request_count = request_count + 1 WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(identity.api_key_id)
        .execute(&self.pool)
        .await?;

        Ok(Some(identity))
    }

    async fn charge_completion(
        &self,
        charge: &CompletionCharge,
    ) -> Result<ChargeReceipt, StoreError> {
        let cost = round_money(charge.cost);
        let total_tokens = (charge.input_tokens + charge.output_tokens) as i64;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        // No-op update takes the write lock before the balance read, standing
        // in for SELECT ... FOR UPDATE. A concurrent charge blocks here until
        // this transaction commits or rolls back.
        sqlx::query("UPDATE accounts SET balance = balance WHERE id = ?")
            .bind(charge.account_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
            .bind(charge.account_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::AccountNotFound(charge.account_id));
        };

        let balance_before: f64 = row.get("balance");
        let balance_after = round_money(balance_before - cost);
        if balance_after < 0.0 {
            // Dropping the transaction rolls it back and releases the lock.
            return Err(StoreError::InsufficientBalance {
                required: cost,
                current: balance_before,
            });
        }

        sqlx::query(
            "UPDATE accounts SET balance = ?, total_requests = total_requests + 1, \
             total_tokens = total_tokens + ?, total_cost = total_cost + ? WHERE id = ?",
        )
        .bind(balance_after)
        .bind(total_tokens)
        .bind(cost)
        .bind(charge.account_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO usage_records \
             (account_id, api_key_id, model, endpoint, input_tokens, output_tokens, \
              total_tokens, cost, duration_ms, client_addr, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(charge.account_id)
        .bind(charge.api_key_id)
        .bind(&charge.model)
        .bind(&charge.endpoint)
        .bind(charge.input_tokens as i64)
        .bind(charge.output_tokens as i64)
        .bind(total_tokens)
        .bind(cost)
        .bind(charge.duration_ms as i64)
        .bind(charge.client_addr.as_deref())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO ledger_entries \
             (account_id, kind, amount, balance_before, balance_after, description, created_at) \
             VALUES (?, 'usage', ?, ?, ?, ?, ?)",
        )
        .bind(charge.account_id)
        .bind(cost)
        .bind(balance_before)
        .bind(balance_after)
        .bind(format!(
            "API request - {} ({} tokens)",
            charge.model, total_tokens
        ))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ChargeReceipt {
            cost,
            balance_before,
            balance_after,
        })
    }

    async fn credit(
        &self,
        account_id: i64,
        kind: LedgerKind,
        amount: f64,
        description: &str,
        reference: Option<&str>,
    ) -> Result<LedgerEntry, StoreError> {
        if kind.is_debit() {
            return Err(StoreError::InvalidCredit(
                "usage entries are written by charge_completion".to_string(),
            ));
        }
        let amount = round_money(amount);
        if !amount.is_finite() || amount <= 0.0 {
            return Err(StoreError::InvalidCredit(format!(
                "amount must be positive, got {amount}"
            )));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE accounts SET balance = balance WHERE id = ?")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::AccountNotFound(account_id));
        };

        let balance_before: f64 = row.get("balance");
        let balance_after = round_money(balance_before + amount);

        sqlx::query("UPDATE accounts SET balance = ? WHERE id = ?")
            .bind(balance_after)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "INSERT INTO ledger_entries \
             (account_id, kind, amount, balance_before, balance_after, description, reference, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(description)
        .bind(reference)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let entry_id = result.last_insert_rowid();

        tx.commit().await?;

        Ok(LedgerEntry {
            id: entry_id,
            account_id,
            kind,
            amount,
            balance_before,
            balance_after,
            description: description.to_string(),
            reference: reference.map(str::to_string),
            created_at: now,
        })
    }

    async fn account(&self, account_id: i64) -> Result<Account, StoreError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Self::account_from_row(&row)),
            None => Err(StoreError::AccountNotFound(account_id)),
        }
    }

    async fn ledger_entries(&self, account_id: i64) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM ledger_entries WHERE account_id = ? ORDER BY id DESC")
                .bind(account_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(Self::ledger_from_row).collect())
    }

    async fn usage_records(&self, account_id: i64) -> Result<Vec<UsageRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM usage_records WHERE account_id = ? ORDER BY id DESC")
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(Self::usage_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_account_with_opening_bonus() {
        let store = memory_store().await;
        let account = store
            .create_account("Aruzhan", "a@example.com", 100.0)
            .await
            .unwrap();
        assert_eq!(account.balance, 100.0);

        let ledger = store.ledger_entries(account.id).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].kind, LedgerKind::Bonus);
        assert_eq!(ledger[0].balance_before, 0.0);
        assert_eq!(ledger[0].balance_after, 100.0);
    }

    #[tokio::test]
    async fn test_resolve_active_key() {
        let store = memory_store().await;
        let account = store
            .create_account("Dias", "d@example.com", 5.0)
            .await
            .unwrap();
        store.create_api_key(account.id, "sk-test-1").await.unwrap();

        let identity = store.resolve_api_key("sk-test-1").await.unwrap().unwrap();
        assert_eq!(identity.account_id, account.id);
        assert_eq!(identity.balance, 5.0);
    }

    #[tokio::test]
    async fn test_resolve_revoked_key_returns_none() {
        let store = memory_store().await;
        let account = store
            .create_account("Dias", "d@example.com", 5.0)
            .await
            .unwrap();
        let key = store.create_api_key(account.id, "sk-test-1").await.unwrap();
        store.deactivate_api_key(key.id).await.unwrap();

        assert!(store.resolve_api_key("sk-test-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_unknown_key_returns_none() {
        let store = memory_store().await;
        assert!(store.resolve_api_key("sk-nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credit_rejects_usage_kind() {
        let store = memory_store().await;
        let account = store
            .create_account("Dias", "d@example.com", 0.0)
            .await
            .unwrap();
        let result = store
            .credit(account.id, LedgerKind::Usage, 10.0, "bad", None)
            .await;
        assert!(matches!(result, Err(StoreError::InvalidCredit(_))));
    }

    #[tokio::test]
    async fn test_credit_rejects_non_positive_amount() {
        let store = memory_store().await;
        let account = store
            .create_account("Dias", "d@example.com", 0.0)
            .await
            .unwrap();
        let result = store
            .credit(account.id, LedgerKind::Deposit, 0.0, "bad", None)
            .await;
        assert!(matches!(result, Err(StoreError::InvalidCredit(_))));
    }
}
