//! Broker trait and implementations for tranche.
//!
//! Provides a generic `Broker` trait covering exactly what a rebalancing
//! job needs from a brokerage: account cash, last quotes, positions, order
//! submission and order lookup. Implementations:
//!
//! - **Mock** (always available): scripted in-memory broker for tests
//! - **Alpaca** (feature `alpaca`): Alpaca trading + market data REST API

pub mod error;
pub mod mock;
pub mod types;

#[cfg(feature = "alpaca")]
pub mod alpaca;

pub use error::BrokerError;
pub use types::*;

use tranche::Ticker;

/// A blocking broker connection.
///
/// All methods take `&self`; implementations needing mutation use interior
/// mutability. Calls may block for as long as the underlying client allows.
pub trait Broker {
    /// Account id and cash balance.
    fn account(&self) -> Result<Account, BrokerError>;

    /// Latest bid/ask for a ticker.
    fn last_quote(&self, ticker: &Ticker) -> Result<Quote, BrokerError>;

    /// All open positions with their current market value.
    fn positions(&self) -> Result<Vec<Position>, BrokerError>;

    /// Submit an order. The request's `client_order_id` is the idempotency key.
    fn place_order(&self, request: &OrderRequest) -> Result<Order, BrokerError>;

    /// Look up an order by broker order id.
    ///
    /// Returns [`BrokerError::OrderNotFound`] when the broker has no such order.
    fn order(&self, order_id: &str) -> Result<Order, BrokerError>;

    /// Look up an order by the caller's client order id.
    ///
    /// Returns [`BrokerError::OrderNotFound`] when the id was never submitted.
    fn order_by_client_id(&self, client_order_id: &str) -> Result<Order, BrokerError>;
}

impl<B: Broker + ?Sized> Broker for &B {
    fn account(&self) -> Result<Account, BrokerError> {
        (**self).account()
    }

    fn last_quote(&self, ticker: &Ticker) -> Result<Quote, BrokerError> {
        (**self).last_quote(ticker)
    }

    fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        (**self).positions()
    }

    fn place_order(&self, request: &OrderRequest) -> Result<Order, BrokerError> {
        (**self).place_order(request)
    }

    fn order(&self, order_id: &str) -> Result<Order, BrokerError> {
        (**self).order(order_id)
    }

    fn order_by_client_id(&self, client_order_id: &str) -> Result<Order, BrokerError> {
        (**self).order_by_client_id(client_order_id)
    }
}

impl<B: Broker + ?Sized> Broker for Box<B> {
    fn account(&self) -> Result<Account, BrokerError> {
        (**self).account()
    }

    fn last_quote(&self, ticker: &Ticker) -> Result<Quote, BrokerError> {
        (**self).last_quote(ticker)
    }

    fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        (**self).positions()
    }

    fn place_order(&self, request: &OrderRequest) -> Result<Order, BrokerError> {
        (**self).place_order(request)
    }

    fn order(&self, order_id: &str) -> Result<Order, BrokerError> {
        (**self).order(order_id)
    }

    fn order_by_client_id(&self, client_order_id: &str) -> Result<Order, BrokerError> {
        (**self).order_by_client_id(client_order_id)
    }
}
