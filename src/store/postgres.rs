//! Postgres-backed billing store
//!
//! Mirror of the SQLite repository for shared deployments. Postgres has a
//! native row lock, so the debit transaction uses `SELECT ... FOR UPDATE`
//! instead of the write-lock workaround.

use super::error::StoreError;
use super::records::{
    Account, ApiKeyRecord, CallerIdentity, ChargeReceipt, CompletionCharge, LedgerEntry,
    LedgerKind, UsageRecord,
};
use super::BillingStore;
use crate::billing::round_money;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS accounts (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        balance DOUBLE PRECISION NOT NULL DEFAULT 0,
        total_requests BIGINT NOT NULL DEFAULT 0,
        total_tokens BIGINT NOT NULL DEFAULT 0,
        total_cost DOUBLE PRECISION NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS api_keys (
        id BIGSERIAL PRIMARY KEY,
        account_id BIGINT NOT NULL REFERENCES accounts(id),
        secret TEXT NOT NULL UNIQUE,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL,
        last_used_at TIMESTAMPTZ,
        request_count BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS usage_records (
        id BIGSERIAL PRIMARY KEY,
        account_id BIGINT NOT NULL REFERENCES accounts(id),
        api_key_id BIGINT NOT NULL REFERENCES api_keys(id),
        model TEXT NOT NULL,
        endpoint TEXT NOT NULL,
        input_tokens BIGINT NOT NULL,
        output_tokens BIGINT NOT NULL,
        total_tokens BIGINT NOT NULL,
        cost DOUBLE PRECISION NOT NULL,
        duration_ms BIGINT NOT NULL,
        client_addr TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS ledger_entries (
        id BIGSERIAL PRIMARY KEY,
        account_id BIGINT NOT NULL REFERENCES accounts(id),
        kind TEXT NOT NULL,
        amount DOUBLE PRECISION NOT NULL,
        balance_before DOUBLE PRECISION NOT NULL,
        balance_after DOUBLE PRECISION NOT NULL,
        description TEXT NOT NULL,
        reference TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_usage_account ON usage_records(account_id)",
    "CREATE INDEX IF NOT EXISTS idx_ledger_account ON ledger_entries(account_id)",
];

/// Postgres repository implementing [`BillingStore`].
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect, then create any missing tables and indexes.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
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

    fn account_from_row(row: &PgRow) -> Account {
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

    fn ledger_from_row(row: &PgRow) -> LedgerEntry {
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

    fn usage_from_row(row: &PgRow) -> UsageRecord {
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
impl BillingStore for PgStore {
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

        let row = sqlx::query(
            "INSERT INTO accounts (name, email, balance, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(name)
        .bind(email)
        .bind(opening)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let account_id: i64 = row.get("id");

        if opening > 0.0 {
            sqlx::query(
                "INSERT INTO ledger_entries \
                 (account_id, kind, amount, balance_before, balance_after, description, created_at) \
                 VALUES ($1, 'bonus', $2, 0, $3, 'Opening balance', $4)",
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
        let row = sqlx::query(
            "INSERT INTO api_keys (account_id, secret, is_active, created_at) \
             VALUES ($1, $2, TRUE, $3) RETURNING id",
        )
        .bind(account_id)
        .bind(secret)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(ApiKeyRecord {
            id: row.get("id"),
            account_id,
            secret: secret.to_string(),
            is_active: true,
            created_at: now,
            last_used_at: None,
            request_count: 0,
        })
    }

    async fn deactivate_api_key(&self, api_key_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE api_keys SET is_active = FALSE WHERE id = $1")
            .bind(api_key_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn resolve_api_key(&self, secret: &str) -> Result<Option<CallerIdentity>, StoreError> {
        let row = sqlx::query(
            "SELECT k.id AS api_key_id, k.account_id, a.balance \
             FROM api_keys k JOIN accounts a ON a.id = k.account_id \
             WHERE k.secret = $1 AND k.is_active",
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
            "UPDATE api_keys SET last_used_at = $1, request_count = request_count + 1 \
             WHERE id = $2",
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

        // Exclusive row lock: concurrent debits for this account queue here.
        let row = sqlx::query("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
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
            "UPDATE accounts SET balance = $1, total_requests = total_requests + 1, \
             total_tokens = total_tokens + $2, total_cost = total_cost + $3 WHERE id = $4",
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
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
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
             VALUES ($1, 'usage', $2, $3, $4, $5, $6)",
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

        let row = sqlx::query("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(StoreError::AccountNotFound(account_id));
        };

        let balance_before: f64 = row.get("balance");
        let balance_after = round_money(balance_before + amount);

        sqlx::query("UPDATE accounts SET balance = $1 WHERE id = $2")
            .bind(balance_after)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            "INSERT INTO ledger_entries \
             (account_id, kind, amount, balance_before, balance_after, description, reference, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
        )
        .bind(account_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(description)
        .bind(reference)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let entry_id: i64 = row.get("id");

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
        let row = sqlx::query("SELECT * FROM accounts WHERE id = $1")
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
            sqlx::query("SELECT * FROM ledger_entries WHERE account_id = $1 ORDER BY id DESC")
                .bind(account_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(Self::ledger_from_row).collect())
    }

    async fn usage_records(&self, account_id: i64) -> Result<Vec<UsageRecord>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM usage_records WHERE account_id = $1 ORDER BY id DESC")
                .bind(account_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(Self::usage_from_row).collect())
    }
}
