//! Store error types

use thiserror::Error;

/// Errors raised by the billing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account {0} not found")]
    AccountNotFound(i64),

    /// Raised inside the locked debit transaction when the re-read balance
    /// cannot cover the actual cost. The transaction is rolled back.
    #[error("insufficient balance: required {required:.4} ₸, current {current:.2} ₸")]
    InsufficientBalance { required: f64, current: f64 },

    #[error("invalid credit: {0}")]
    InvalidCredit(String),

    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
