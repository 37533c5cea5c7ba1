// Allow our dollar.cents digit grouping convention (e.g., 1_500_00 = $1500.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! Allocation planner benchmarks: full deltas and buy-only scaling.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;
use tranche::{AllocationPlanner, Holdings, Ticker, Weights, compute_full_deltas};

/// Build `n` tickers with uneven weights and holdings.
///
/// Uses a simple deterministic PRNG so runs are comparable.
fn generate_portfolio(n: usize) -> (Weights, Holdings) {
    let mut rng_state: u32 = 42;
    let mut next = || {
        // xorshift32
        rng_state ^= rng_state << 13;
        rng_state ^= rng_state >> 17;
        rng_state ^= rng_state << 5;
        rng_state
    };

    let mut weights = Weights::new();
    let mut holdings = Holdings::new();
    for i in 0..n {
        let ticker = Ticker::new(&format!("S{i:04}")).unwrap();
        weights.insert(ticker.clone(), Decimal::new(i64::from(next() % 10_000) + 1, 2));
        // every third name is not held, every fifth is held but unwanted
        if i % 3 != 0 {
            holdings.insert(ticker, Decimal::new(i64::from(next() % 5_000_000), 2));
        }
        if i % 5 == 0 {
            let extra = Ticker::new(&format!("X{i:04}")).unwrap();
            holdings.insert(extra, Decimal::new(i64::from(next() % 1_000_000), 2));
        }
    }
    (weights, holdings)
}

fn bench_full_deltas(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation/full_deltas");
    for n in [10usize, 100, 1_000] {
        let (weights, holdings) = generate_portfolio(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                black_box(compute_full_deltas(
                    black_box(&holdings),
                    black_box(&weights),
                    Decimal::new(1_500_00, 2),
                ))
            })
        });
    }
    group.finish();
}

fn bench_without_sales(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation/without_sales");
    for n in [10usize, 100, 1_000] {
        let (weights, holdings) = generate_portfolio(n);
        let planner = AllocationPlanner::new(weights).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let budget = Decimal::new(1_500_00, 2);
                black_box(planner.deltas_without_sales(black_box(&holdings), budget))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_full_deltas, bench_without_sales);
criterion_main!(benches);
