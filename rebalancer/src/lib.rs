//! tranche-rebalancer: cash-in portfolio rebalancer on top of `tranche`.
//!
//! Each run reconciles the trade records left open by earlier runs, computes
//! buy-only deltas from the broker's positions and cash, and places one
//! market order per ticker, writing a trade record before every order and
//! an audit trail of the whole run.

pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod executor;
pub mod portfolio;
pub mod reconcile;
pub mod store;
