//! # tranche
//!
//! Decision-and-bookkeeping core for a periodic portfolio-rebalancing job.
//!
//! ## Features
//!
//! - **Allocation planner**: holdings + target weights + new cash → per-ticker
//!   dollar deltas, with or without sales
//! - **Exact arithmetic**: every amount is a [`rust_decimal::Decimal`]; the
//!   deltas always sum to the invested amount, to the last digit
//! - **Trade records**: an explicit `Unreconciled → Reconciled` lifecycle for
//!   each order, written before the order reaches the broker
//!
//! This crate does no IO. The broker client lives in `tranche-broker`; the
//! record store, order executor, reconciliation engine and CLI live in
//! `tranche-rebalancer`.
//!
//! ## Quick Start
//!
//! ```
//! use std::collections::BTreeMap;
//! use rust_decimal::Decimal;
//! use tranche::{AllocationPlanner, Ticker};
//!
//! let spy = Ticker::new("SPY").unwrap();
//! let vbd = Ticker::new("VBD").unwrap();
//!
//! let planner = AllocationPlanner::new(BTreeMap::from([
//!     (spy.clone(), Decimal::from(80)),
//!     (vbd.clone(), Decimal::from(20)),
//! ]))
//! .unwrap();
//!
//! // Holding $1000 of SPY and investing $100 more:
//! let holdings = BTreeMap::from([(spy.clone(), Decimal::from(1000))]);
//!
//! // With sales, SPY is trimmed and VBD topped up.
//! let full = planner.deltas_with_sales(&holdings, Decimal::from(100)).unwrap();
//! assert_eq!(full[&spy], Decimal::from(-120));
//! assert_eq!(full[&vbd], Decimal::from(220));
//!
//! // Buy-only: the VBD buy is shrunk to the $100 actually available.
//! let buys = planner.deltas_without_sales(&holdings, Decimal::from(100)).unwrap();
//! assert_eq!(buys.len(), 1);
//! assert_eq!(buys[&vbd], Decimal::from(100));
//! ```
//!
//! ## Trade Records
//!
//! ```
//! use chrono::Utc;
//! use rust_decimal::Decimal;
//! use tranche::{Phase, RecordStatus, Ticker, TradeRecord, Transition};
//!
//! let mut rec = TradeRecord::new(Ticker::new("SPY").unwrap(), Decimal::from(9));
//! assert_eq!(rec.phase(), Phase::Created);
//!
//! rec.mark_submitted("b7f0c2", Utc::now()).unwrap();
//! assert_eq!(rec.status(), RecordStatus::Unreconciled);
//!
//! assert_eq!(rec.mark_reconciled(Utc::now()), Transition::Applied);
//! assert_eq!(rec.mark_reconciled(Utc::now()), Transition::Unchanged);
//! ```

pub mod allocation;
pub mod error;
pub mod record;
pub mod types;

pub use allocation::{AllocationPlanner, DELTA_SCALE, amount_to_invest, compute_full_deltas};
pub use error::{AllocationError, RecordError, TickerError};
pub use record::{Phase, RecordStatus, TradeRecord, Transition};
pub use types::{Deltas, Holdings, Ticker, Weights};

pub use rust_decimal::Decimal;
