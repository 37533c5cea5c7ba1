//! Alpaca REST API client.

use std::time::Duration;

use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use super::types::{
    AccountResponse, ApiError, LatestQuoteResponse, NewOrder, OrderResponse, PositionResponse,
};
use crate::error::BrokerError;

pub const PAPER_URL: &str = "https://paper-api.alpaca.markets";
pub const DATA_URL: &str = "https://data.alpaca.markets";

/// Which API call a response came from. Decides what a 404 means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Account,
    Positions,
    SubmitOrder,
    Order,
    OrderLookup,
    Quote,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Account => "account",
            Endpoint::Positions => "positions",
            Endpoint::SubmitOrder => "order",
            Endpoint::Order => "order status",
            Endpoint::OrderLookup => "order lookup",
            Endpoint::Quote => "quote",
        }
    }
}

/// Blocking Alpaca REST client for the trading and market data APIs.
pub struct AlpacaClient {
    client: Client,
    key_id: String,
    secret_key: Zeroizing<String>,
    base_url: String,
    data_url: String,
}

impl AlpacaClient {
    pub fn new(
        key_id: &str,
        secret_key: &str,
        base_url: &str,
        data_url: &str,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Connection(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            key_id: key_id.to_string(),
            secret_key: Zeroizing::new(secret_key.to_string()),
            base_url: base_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
        })
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", self.secret_key.as_str())
    }

    fn send(&self, endpoint: Endpoint, req: RequestBuilder) -> Result<Response, BrokerError> {
        let what = endpoint.as_str();
        let resp = self
            .authed(req)
            .send()
            .map_err(|e| BrokerError::Connection(format!("{what} request failed: {e}")))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        Err(status_error(endpoint, resp))
    }

    fn parse<T: DeserializeOwned>(endpoint: Endpoint, resp: Response) -> Result<T, BrokerError> {
        resp.json::<T>().map_err(|e| {
            BrokerError::Parse(format!("failed to parse {}: {e}", endpoint.as_str()))
        })
    }

    /// GET /v2/account
    pub fn account(&self) -> Result<AccountResponse, BrokerError> {
        let url = format!("{}/v2/account", self.base_url);
        let resp = self.send(Endpoint::Account, self.client.get(&url))?;
        Self::parse(Endpoint::Account, resp)
    }

    /// GET /v2/positions
    pub fn positions(&self) -> Result<Vec<PositionResponse>, BrokerError> {
        let url = format!("{}/v2/positions", self.base_url);
        let resp = self.send(Endpoint::Positions, self.client.get(&url))?;
        Self::parse(Endpoint::Positions, resp)
    }

    /// POST /v2/orders
    pub fn submit_order(&self, order: &NewOrder<'_>) -> Result<OrderResponse, BrokerError> {
        let url = format!("{}/v2/orders", self.base_url);
        debug!(
            "Submitting Alpaca order: {} {} {} (client id {})",
            order.side, order.qty, order.symbol, order.client_order_id
        );
        let resp = self.send(Endpoint::SubmitOrder, self.client.post(&url).json(order))?;
        Self::parse(Endpoint::SubmitOrder, resp)
    }

    /// GET /v2/orders/{id}
    pub fn order(&self, order_id: &str) -> Result<OrderResponse, BrokerError> {
        let url = format!("{}/v2/orders/{order_id}", self.base_url);
        let resp = self.send(Endpoint::Order, self.client.get(&url))?;
        Self::parse(Endpoint::Order, resp)
    }

    /// GET /v2/orders:by_client_order_id
    pub fn order_by_client_id(&self, client_order_id: &str) -> Result<OrderResponse, BrokerError> {
        let url = format!("{}/v2/orders:by_client_order_id", self.base_url);
        let req = self
            .client
            .get(&url)
            .query(&[("client_order_id", client_order_id)]);
        let resp = self.send(Endpoint::OrderLookup, req)?;
        Self::parse(Endpoint::OrderLookup, resp)
    }

    /// GET {data}/v2/stocks/{symbol}/quotes/latest
    pub fn latest_quote(&self, symbol: &str) -> Result<LatestQuoteResponse, BrokerError> {
        let url = format!("{}/v2/stocks/{symbol}/quotes/latest", self.data_url);
        let resp = self.send(Endpoint::Quote, self.client.get(&url))?;
        Self::parse(Endpoint::Quote, resp)
    }
}

fn status_error(endpoint: Endpoint, resp: Response) -> BrokerError {
    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    classify(endpoint, status, &body)
}

/// Map a non-success HTTP status and body to a broker error.
///
/// Only the order lookups turn a 404 into `OrderNotFound`; a 404 from the
/// quote endpoint is an unknown symbol.
pub fn classify(endpoint: Endpoint, status: StatusCode, body: &str) -> BrokerError {
    let what = endpoint.as_str();
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string());
    match status {
        StatusCode::NOT_FOUND => match endpoint {
            Endpoint::Order | Endpoint::OrderLookup => {
                BrokerError::OrderNotFound(format!("{what}: {message}"))
            }
            Endpoint::Quote => BrokerError::InvalidSymbol(format!("{what}: {message}")),
            _ => BrokerError::Other(format!("{what} returned {status}: {message}")),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BrokerError::Auth(format!("{what} returned {status}: {message}"))
        }
        StatusCode::TOO_MANY_REQUESTS => BrokerError::RateLimit,
        StatusCode::UNPROCESSABLE_ENTITY => {
            BrokerError::Order(format!("{what} returned {status}: {message}"))
        }
        s if s.is_server_error() => {
            BrokerError::Connection(format!("{what} returned {status}: {message}"))
        }
        _ => BrokerError::Other(format!("{what} returned {status}: {message}")),
    }
}
