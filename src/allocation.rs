//! Allocation planner: holdings + target weights + investable cash → dollar deltas.
//!
//! Two modes share [`compute_full_deltas`]:
//!
//! - [`AllocationPlanner::deltas_with_sales`] returns the full signed deltas,
//!   including sales of overweight or unwanted instruments.
//! - [`AllocationPlanner::deltas_without_sales`] keeps only the buys and
//!   shrinks them so they fit the new cash, since sale proceeds are not
//!   realized by a buy-only job.
//!
//! Both modes conserve dollars exactly: the deltas always sum to the amount
//! being invested. Desired amounts are truncated to [`DELTA_SCALE`] decimal
//! places and the rounding residual is assigned to the entry with the
//! largest weight, so the sum matches to the last digit.
//!
//! ```
//! use std::collections::BTreeMap;
//! use rust_decimal::Decimal;
//! use tranche::{AllocationPlanner, Ticker};
//!
//! let spy = Ticker::new("SPY").unwrap();
//! let vbd = Ticker::new("VBD").unwrap();
//! let weights = BTreeMap::from([
//!     (spy.clone(), Decimal::from(80)),
//!     (vbd.clone(), Decimal::from(20)),
//! ]);
//! let planner = AllocationPlanner::new(weights).unwrap();
//!
//! let deltas = planner.deltas_with_sales(&BTreeMap::new(), Decimal::from(1000)).unwrap();
//! assert_eq!(deltas[&spy], Decimal::from(800));
//! assert_eq!(deltas[&vbd], Decimal::from(200));
//! ```

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::AllocationError;
use crate::types::{Deltas, Holdings, Ticker, Weights, checked_sum};

/// Decimal places kept on computed deltas.
pub const DELTA_SCALE: u32 = 10;

/// Target-weight allocation planner.
#[derive(Debug, Clone)]
pub struct AllocationPlanner {
    weights: Weights,
}

impl AllocationPlanner {
    /// Create a planner, rejecting unusable weight maps up front.
    pub fn new(weights: Weights) -> Result<Self, AllocationError> {
        validate_weights(&weights)?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Full signed deltas, sales included. Sums to `amount_to_invest`.
    pub fn deltas_with_sales(
        &self,
        holdings: &Holdings,
        amount_to_invest: Decimal,
    ) -> Result<Deltas, AllocationError> {
        compute_full_deltas(holdings, &self.weights, amount_to_invest)
    }

    /// Buy-only deltas scaled to fit `amount_to_invest`.
    ///
    /// Never contains a zero or negative entry. Empty when there is nothing
    /// to buy or nothing to spend.
    pub fn deltas_without_sales(
        &self,
        holdings: &Holdings,
        amount_to_invest: Decimal,
    ) -> Result<Deltas, AllocationError> {
        let full = compute_full_deltas(holdings, &self.weights, amount_to_invest)?;
        scale_buys_to_budget(&full, amount_to_invest)
    }
}

/// Shared step of both modes.
///
/// Tickers held but absent from `weights` are fully liquidated
/// (`delta = -holding`).
pub fn compute_full_deltas(
    holdings: &Holdings,
    weights: &Weights,
    amount_to_invest: Decimal,
) -> Result<Deltas, AllocationError> {
    let total_weight = validate_weights(weights)?;

    let total = checked_sum(holdings.values())
        .and_then(|h| h.checked_add(amount_to_invest))
        .ok_or(AllocationError::Overflow("portfolio total"))?;

    // divvy up the future pie
    let mut desired = Deltas::new();
    for (ticker, weight) in weights {
        let share = weight
            .checked_mul(total)
            .and_then(|v| v.checked_div(total_weight))
            .ok_or(AllocationError::Overflow("desired amount"))?
            .round_dp_with_strategy(DELTA_SCALE, RoundingStrategy::ToZero);
        desired.insert(ticker.clone(), share);
    }
    if let Some(anchor) = largest_entry(weights) {
        absorb_residual(&mut desired, anchor, total)?;
    }

    let mut deltas = Deltas::new();
    for (ticker, want) in desired {
        let held = holdings.get(&ticker).copied().unwrap_or(Decimal::ZERO);
        let delta = want
            .checked_sub(held)
            .ok_or(AllocationError::Overflow("delta"))?;
        deltas.insert(ticker, delta);
    }

    for (ticker, held) in holdings {
        if !weights.contains_key(ticker) {
            deltas.insert(ticker.clone(), -*held);
        }
    }

    Ok(deltas)
}

/// Keep the positive deltas and rescale them so they sum to `amount_to_invest`.
pub fn scale_buys_to_budget(
    full: &Deltas,
    amount_to_invest: Decimal,
) -> Result<Deltas, AllocationError> {
    let buys: Deltas = full
        .iter()
        .filter(|(_, d)| d.is_sign_positive() && !d.is_zero())
        .map(|(t, d)| (t.clone(), *d))
        .collect();

    let total_desired_spend =
        checked_sum(buys.values()).ok_or(AllocationError::Overflow("desired spend"))?;
    if total_desired_spend.is_zero() || amount_to_invest <= Decimal::ZERO {
        return Ok(Deltas::new());
    }

    // buys assume every sale is reinvested today; only new cash is real
    let mut scaled = Deltas::new();
    for (ticker, delta) in &buys {
        let v = delta
            .checked_mul(amount_to_invest)
            .and_then(|v| v.checked_div(total_desired_spend))
            .ok_or(AllocationError::Overflow("scaled delta"))?
            .round_dp_with_strategy(DELTA_SCALE, RoundingStrategy::ToZero);
        scaled.insert(ticker.clone(), v);
    }
    if let Some(anchor) = largest_entry(&buys) {
        absorb_residual(&mut scaled, anchor, amount_to_invest)?;
    }

    scaled.retain(|_, v| *v > Decimal::ZERO);
    Ok(scaled)
}

/// `min(max_amount, cash)`, never negative.
pub fn amount_to_invest(max_amount: Decimal, cash: Decimal) -> Decimal {
    max_amount.min(cash).max(Decimal::ZERO)
}

/// Returns the weight total on success.
fn validate_weights(weights: &Weights) -> Result<Decimal, AllocationError> {
    if weights.is_empty() {
        return Err(AllocationError::EmptyWeights);
    }
    let negative = weights.iter().find(|(_, w)| w.is_sign_negative() && !w.is_zero());
    if let Some((ticker, weight)) = negative {
        return Err(AllocationError::NegativeWeight {
            ticker: ticker.to_string(),
            weight: *weight,
        });
    }
    let total = checked_sum(weights.values()).ok_or(AllocationError::Overflow("total weight"))?;
    if total.is_zero() {
        return Err(AllocationError::ZeroTotalWeight);
    }
    Ok(total)
}

/// Ticker with the largest value; first in ticker order on ties.
fn largest_entry(map: &Deltas) -> Option<&Ticker> {
    let mut best: Option<(&Ticker, Decimal)> = None;
    for (ticker, v) in map {
        match best {
            Some((_, b)) if *v <= b => {}
            _ => best = Some((ticker, *v)),
        }
    }
    best.map(|(t, _)| t)
}

/// Add `target - sum(values)` onto `anchor`.
fn absorb_residual(
    values: &mut Deltas,
    anchor: &Ticker,
    target: Decimal,
) -> Result<(), AllocationError> {
    let sum = checked_sum(values.values()).ok_or(AllocationError::Overflow("residual"))?;
    let residual = target
        .checked_sub(sum)
        .ok_or(AllocationError::Overflow("residual"))?;
    if residual.is_zero() {
        return Ok(());
    }
    if let Some(v) = values.get_mut(anchor) {
        *v = v
            .checked_add(residual)
            .ok_or(AllocationError::Overflow("residual"))?;
    }
    Ok(())
}
