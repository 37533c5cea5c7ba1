//! Shared broker types: accounts, quotes, positions, orders.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tranche::Ticker;

/// Account summary from the broker.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub cash: Decimal,
    pub equity: Decimal,
}

/// Latest top-of-book quote.
#[derive(Debug, Clone)]
pub struct Quote {
    pub ticker: Ticker,
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Quote {
    /// Price used to size an order on `side`: the bid for buys, the ask for sells.
    pub fn price_for(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.bid,
            Side::Sell => self.ask,
        }
    }
}

/// Broker-level position.
#[derive(Debug, Clone)]
pub struct Position {
    pub ticker: Ticker,
    /// Positive = long, negative = short.
    pub quantity: Decimal,
    /// Current market value in dollars.
    pub market_value: Decimal,
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only market orders are placed by the rebalancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "market",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    Day,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeInForce::Day => "day",
        }
    }
}

/// Order to submit to a broker.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub account_id: String,
    pub ticker: Ticker,
    pub quantity: Decimal,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    /// Idempotency key; resubmitting the same id never creates a second order.
    pub client_order_id: String,
}

impl OrderRequest {
    /// Market, day order.
    pub fn market_day(
        account_id: &str,
        ticker: Ticker,
        quantity: Decimal,
        side: Side,
        client_order_id: &str,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            ticker,
            quantity,
            side,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            client_order_id: client_order_id.to_string(),
        }
    }
}

/// Broker-side order as last reported.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub client_order_id: String,
    pub ticker: Ticker,
    pub status: OrderStatus,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub side: Side,
    pub updated_at: DateTime<Utc>,
}

/// Broker order status.
///
/// Unknown status strings are kept verbatim and treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    Accepted,
    PendingNew,
    PartiallyFilled,
    Filled,
    DoneForDay,
    Canceled,
    Expired,
    Replaced,
    PendingCancel,
    PendingReplace,
    Rejected,
    Suspended,
    Other(String),
}

impl OrderStatus {
    /// No further state change is expected after a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Expired
                | OrderStatus::Rejected
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Accepted => "accepted",
            OrderStatus::PendingNew => "pending_new",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::DoneForDay => "done_for_day",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Expired => "expired",
            OrderStatus::Replaced => "replaced",
            OrderStatus::PendingCancel => "pending_cancel",
            OrderStatus::PendingReplace => "pending_replace",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Suspended => "suspended",
            OrderStatus::Other(s) => s,
        }
    }
}

impl FromStr for OrderStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "new" => OrderStatus::New,
            "accepted" => OrderStatus::Accepted,
            "pending_new" => OrderStatus::PendingNew,
            "partially_filled" => OrderStatus::PartiallyFilled,
            "filled" => OrderStatus::Filled,
            "done_for_day" => OrderStatus::DoneForDay,
            "canceled" | "cancelled" => OrderStatus::Canceled,
            "expired" => OrderStatus::Expired,
            "replaced" => OrderStatus::Replaced,
            "pending_cancel" => OrderStatus::PendingCancel,
            "pending_replace" => OrderStatus::PendingReplace,
            "rejected" => OrderStatus::Rejected,
            "suspended" => OrderStatus::Suspended,
            other => OrderStatus::Other(other.to_string()),
        })
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
