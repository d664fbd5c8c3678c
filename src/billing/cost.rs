//! Monetary cost computation
//!
//! Costs are computed in full `f64` precision; rounding happens only at the
//! presentation/storage edge via [`round_money`].

use super::pricing::PricingTable;

/// Decimal places kept when a cost is presented or stored.
const MONEY_DECIMALS: i32 = 4;

/// Compute the cost of a completion in ₸.
///
/// `input_tokens / 1e6 * input_price + output_tokens / 1e6 * output_price`,
/// using the table's fallback pricing for unrecognized models. Pure function;
/// no rounding is applied here.
pub fn completion_cost(
    table: &PricingTable,
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
) -> f64 {
    let pricing = table.get(model);
    let input_cost = input_tokens as f64 / 1_000_000.0 * pricing.input_per_million;
    let output_cost = output_tokens as f64 / 1_000_000.0 * pricing.output_per_million;
    input_cost + output_cost
}

/// Round a monetary amount to the fixed presentation precision (4 dp).
pub fn round_money(amount: f64) -> f64 {
    let factor = 10f64.powi(MONEY_DECIMALS);
    (amount * factor).round() / factor
}
