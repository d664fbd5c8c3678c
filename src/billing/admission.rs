//! Pre-flight admission check
//!
//! The check is optimistic: it compares the caller's balance snapshot against
//! a worst-case cost (full output budget consumed) but reserves nothing.
//! Concurrent requests from one account can all pass here; the locked debit
//! transaction in [`crate::store`] is what actually prevents overspend.

use super::AdmissionError;

/// Reject iff the balance cannot cover the worst-case cost, or sits below the
/// absolute minimum required to use the API at all.
pub fn check_admission(
    balance: f64,
    estimated_cost: f64,
    min_balance: f64,
) -> Result<(), AdmissionError> {
    if balance < estimated_cost || balance < min_balance {
        return Err(AdmissionError::InsufficientBalance {
            required: estimated_cost,
            current: balance,
        });
    }
    Ok(())
}
