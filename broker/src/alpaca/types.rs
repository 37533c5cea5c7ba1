//! Alpaca-specific API response types and their conversion to broker types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tranche::Ticker;

use crate::error::BrokerError;
use crate::types::{Account, Order, OrderStatus, Position, Quote, Side};

/// Alpaca account response (GET /v2/account). Money fields are strings.
#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    pub id: String,
    pub cash: String,
    #[serde(default)]
    pub equity: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Alpaca position entry (GET /v2/positions).
#[derive(Debug, Deserialize)]
pub struct PositionResponse {
    pub symbol: String,
    pub qty: String,
    #[serde(default)]
    pub market_value: Option<String>,
}

/// Alpaca order (POST /v2/orders, GET /v2/orders/{id}).
#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub client_order_id: String,
    pub symbol: String,
    #[serde(default)]
    pub qty: Option<String>,
    #[serde(default)]
    pub filled_qty: Option<String>,
    pub side: String,
    pub status: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Latest quote envelope (GET /v2/stocks/{symbol}/quotes/latest).
#[derive(Debug, Deserialize)]
pub struct LatestQuoteResponse {
    #[serde(default)]
    pub symbol: Option<String>,
    pub quote: QuoteBody,
}

#[derive(Debug, Deserialize)]
pub struct QuoteBody {
    pub bp: serde_json::Number,
    pub ap: serde_json::Number,
}

/// Error body Alpaca returns on 4xx.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<u64>,
    #[serde(default)]
    pub message: String,
}

/// Order submission body (POST /v2/orders).
#[derive(Debug, Serialize)]
pub struct NewOrder<'a> {
    pub symbol: &'a str,
    pub qty: String,
    pub side: &'a str,
    #[serde(rename = "type")]
    pub order_type: &'a str,
    pub time_in_force: &'a str,
    pub client_order_id: &'a str,
}

/// Parse a decimal string such as `"1234.56"`.
pub fn parse_decimal(field: &str, s: &str) -> Result<Decimal, BrokerError> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| BrokerError::Parse(format!("{field}: {s:?}: {e}")))
}

fn parse_number(field: &str, n: &serde_json::Number) -> Result<Decimal, BrokerError> {
    parse_decimal(field, &n.to_string())
}

fn parse_ticker(s: &str) -> Result<Ticker, BrokerError> {
    Ticker::new(s).map_err(|e| BrokerError::InvalidSymbol(format!("{s}: {e}")))
}

fn parse_side(s: &str) -> Result<Side, BrokerError> {
    match s {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(BrokerError::Parse(format!("unknown order side {other:?}"))),
    }
}

impl AccountResponse {
    pub fn into_account(self) -> Result<Account, BrokerError> {
        let cash = parse_decimal("cash", &self.cash)?;
        let equity = match &self.equity {
            Some(e) => parse_decimal("equity", e)?,
            None => cash,
        };
        Ok(Account {
            id: self.id,
            cash,
            equity,
        })
    }
}

impl PositionResponse {
    pub fn into_position(self) -> Result<Position, BrokerError> {
        Ok(Position {
            ticker: parse_ticker(&self.symbol)?,
            quantity: parse_decimal("qty", &self.qty)?,
            market_value: match &self.market_value {
                Some(v) => parse_decimal("market_value", v)?,
                None => Decimal::ZERO,
            },
        })
    }
}

impl OrderResponse {
    pub fn into_order(self) -> Result<Order, BrokerError> {
        let opt = |field: &str, v: &Option<String>| match v {
            Some(s) => parse_decimal(field, s),
            None => Ok(Decimal::ZERO),
        };
        let quantity = opt("qty", &self.qty)?;
        let filled_quantity = opt("filled_qty", &self.filled_qty)?;
        let status = match OrderStatus::from_str(&self.status) {
            Ok(s) => s,
            Err(never) => match never {},
        };
        Ok(Order {
            ticker: parse_ticker(&self.symbol)?,
            side: parse_side(&self.side)?,
            id: self.id,
            client_order_id: self.client_order_id,
            status,
            quantity,
            filled_quantity,
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        })
    }
}

impl LatestQuoteResponse {
    pub fn into_quote(self, ticker: &Ticker) -> Result<Quote, BrokerError> {
        Ok(Quote {
            ticker: ticker.clone(),
            bid: parse_number("bp", &self.quote.bp)?,
            ask: parse_number("ap", &self.quote.ap)?,
        })
    }
}
