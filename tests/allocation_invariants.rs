//! Property-based tests for allocation planner invariants.
//!
//! These tests use proptest to verify that the conservation laws hold
//! exactly across randomly generated portfolios.

use proptest::prelude::*;
use rust_decimal::Decimal;
use tranche::{AllocationPlanner, Holdings, Ticker, Weights, compute_full_deltas};

const UNIVERSE: [&str; 10] = [
    "SPY", "VBD", "VOO", "QQQ", "IWM", "AGG", "BND", "VTI", "GLD", "TLT",
];

fn ticker(i: usize) -> Ticker {
    Ticker::new(UNIVERSE[i]).unwrap()
}

/// Positive weight with up to 4 decimal places (0.0001 ..= 1000.0000)
fn weight_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000i64).prop_map(|n| Decimal::new(n, 4))
}

/// Dollar amount in cents ($0.00 ..= $10M)
fn dollars_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=1_000_000_000i64).prop_map(|c| Decimal::new(c, 2))
}

fn weights_strategy() -> impl Strategy<Value = Weights> {
    prop::collection::btree_map(0usize..6, weight_strategy(), 1..6)
        .prop_map(|m| m.into_iter().map(|(i, w)| (ticker(i), w)).collect())
}

/// Holdings may include tickers outside the weight universe (indices 6..10).
fn holdings_strategy() -> impl Strategy<Value = Holdings> {
    prop::collection::btree_map(0usize..10, dollars_strategy(), 0..8)
        .prop_map(|m| m.into_iter().map(|(i, v)| (ticker(i), v)).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // ========================================================================
    // CONSERVATION INVARIANTS
    // ========================================================================

    /// Rebalancing never creates or destroys dollars beyond the new cash.
    #[test]
    fn with_sales_sum_equals_amount(
        weights in weights_strategy(),
        holdings in holdings_strategy(),
        amount in dollars_strategy(),
    ) {
        let deltas = compute_full_deltas(&holdings, &weights, amount).unwrap();
        let sum: Decimal = deltas.values().copied().sum();
        prop_assert_eq!(sum, amount);
    }

    /// Every weighted ticker and every held ticker gets a delta.
    #[test]
    fn with_sales_covers_all_tickers(
        weights in weights_strategy(),
        holdings in holdings_strategy(),
        amount in dollars_strategy(),
    ) {
        let deltas = compute_full_deltas(&holdings, &weights, amount).unwrap();
        for t in weights.keys().chain(holdings.keys()) {
            prop_assert!(deltas.contains_key(t), "missing delta for {}", t);
        }
        for (t, held) in &holdings {
            if !weights.contains_key(t) {
                prop_assert_eq!(deltas[t], -*held);
            }
        }
    }

    /// Buy-only deltas are strictly positive and spend exactly the budget.
    #[test]
    fn without_sales_positive_and_conserving(
        weights in weights_strategy(),
        holdings in holdings_strategy(),
        amount in (1i64..=1_000_000_000i64).prop_map(|c| Decimal::new(c, 2)),
    ) {
        let planner = AllocationPlanner::new(weights.clone()).unwrap();
        let full = planner.deltas_with_sales(&holdings, amount).unwrap();
        let buys = planner.deltas_without_sales(&holdings, amount).unwrap();

        prop_assert!(buys.values().all(|d| *d > Decimal::ZERO));
        // full deltas sum to a positive amount, so at least one is a buy
        prop_assert!(full.values().any(|d| *d > Decimal::ZERO));

        let sum: Decimal = buys.values().copied().sum();
        prop_assert_eq!(sum, amount);

        for t in buys.keys() {
            prop_assert!(full[t] > Decimal::ZERO, "{} bought but full delta not positive", t);
        }
    }

    /// GetAmountToInvest is min(max, cash).
    #[test]
    fn amount_to_invest_is_min(max in dollars_strategy(), cash in dollars_strategy()) {
        prop_assert_eq!(tranche::amount_to_invest(max, cash), max.min(cash));
    }
}
