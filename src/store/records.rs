//! Typed records for the billing store
//!
//! Every row crossing the data-access boundary is decoded into one of these
//! structs; nothing dynamically typed leaks out of the repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A billable account. The balance is mutated only inside the store's locked
/// transactions; accounts are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Current balance in ₸. Never committed negative.
    pub balance: f64,
    pub total_requests: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
}

/// An API key bound to an account. Revocation flips `is_active`; rows are
/// never hard-deleted so historical usage keeps its attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: i64,
    pub account_id: i64,
    pub secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub request_count: i64,
}

/// Resolved caller identity: the account and key behind a bearer secret,
/// with a balance snapshot taken at resolution time.
///
/// The snapshot feeds the advisory pre-flight check only; the debit
/// transaction re-reads the balance under a lock.
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity {
    pub account_id: i64,
    pub api_key_id: i64,
    pub balance: f64,
}

/// Immutable fact row for one billed completion request. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: i64,
    pub account_id: i64,
    pub api_key_id: i64,
    pub model: String,
    pub endpoint: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cost: f64,
    pub duration_ms: i64,
    pub client_addr: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Kind of balance-affecting transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Completion debit
    Usage,
    /// Balance top-up
    Deposit,
    Refund,
    Bonus,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Usage => "usage",
            LedgerKind::Deposit => "deposit",
            LedgerKind::Refund => "refund",
            LedgerKind::Bonus => "bonus",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "usage" => Some(LedgerKind::Usage),
            "deposit" => Some(LedgerKind::Deposit),
            "refund" => Some(LedgerKind::Refund),
            "bonus" => Some(LedgerKind::Bonus),
            _ => None,
        }
    }

    /// Whether entries of this kind decrease the balance.
    pub fn is_debit(&self) -> bool {
        matches!(self, LedgerKind::Usage)
    }
}

/// Immutable balance transaction row. Append-only.
///
/// Invariant: `balance_after == balance_before - amount` for debits and
/// `balance_before + amount` for credits, and `balance_after` equals the
/// account balance at the instant the entry is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: i64,
    pub kind: LedgerKind,
    pub amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub description: String,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Inputs to the locked debit transaction for one completed request.
#[derive(Debug, Clone)]
pub struct CompletionCharge {
    pub account_id: i64,
    pub api_key_id: i64,
    pub model: String,
    pub endpoint: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Actual cost computed from the real token counts; rounded to the
    /// storage precision inside the transaction.
    pub cost: f64,
    pub duration_ms: u64,
    pub client_addr: Option<String>,
}

/// Outcome of a committed debit transaction.
#[derive(Debug, Clone, Copy)]
pub struct ChargeReceipt {
    /// Rounded amount actually debited
    pub cost: f64,
    pub balance_before: f64,
    pub balance_after: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_kind_round_trip() {
        for kind in [
            LedgerKind::Usage,
            LedgerKind::Deposit,
            LedgerKind::Refund,
            LedgerKind::Bonus,
        ] {
            assert_eq!(LedgerKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(LedgerKind::parse("withdrawal"), None);
    }

    #[test]
    fn test_only_usage_is_debit() {
        assert!(LedgerKind::Usage.is_debit());
        assert!(!LedgerKind::Deposit.is_debit());
        assert!(!LedgerKind::Refund.is_debit());
        assert!(!LedgerKind::Bonus.is_debit());
    }

    #[test]
    fn test_ledger_kind_serde_snake_case() {
        let json = serde_json::to_string(&LedgerKind::Usage).unwrap();
        assert_eq!(json, "\"usage\"");
    }
}
