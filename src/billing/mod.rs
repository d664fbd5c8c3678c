//! Metered billing primitives
//!
//! Everything in this module is pure: pricing lookup, token estimation, cost
//! computation, and the pre-flight admission check. The only stateful part of
//! billing, the locked debit transaction, lives in [`crate::store`].

pub mod admission;
pub mod cost;
pub mod pricing;
pub mod tokens;

pub use admission::check_admission;
pub use cost::{completion_cost, round_money};
pub use pricing::{ModelPricing, PricingTable};
pub use tokens::{
    estimate_tokens, estimate_tokens_uncapped, TokenEstimateError, MAX_MESSAGE_CHARS,
};

use thiserror::Error;

/// Billing-level rejection raised before any upstream call or debit.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Balance cannot cover the worst-case cost of the request.
    #[error("insufficient balance: required {required:.4} ₸, current {current:.2} ₸")]
    InsufficientBalance { required: f64, current: f64 },
}
