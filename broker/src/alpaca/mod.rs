//! Alpaca broker implementation.

pub mod client;
pub mod types;

use std::time::Duration;

use log::{info, warn};
use tranche::Ticker;

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;
use client::AlpacaClient;
use types::NewOrder;

/// Alpaca connection settings.
#[derive(Debug, Clone)]
pub struct AlpacaConfig {
    /// Trading API root, e.g. [`client::PAPER_URL`].
    pub base_url: String,
    /// Market data API root.
    pub data_url: String,
    pub timeout: Duration,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            base_url: client::PAPER_URL.to_string(),
            data_url: client::DATA_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Alpaca broker implementing the generic Broker trait.
///
/// Uses the REST API for all operations. Blocking (sync) via reqwest::blocking.
pub struct AlpacaBroker {
    client: AlpacaClient,
}

impl AlpacaBroker {
    pub fn new(key_id: &str, secret_key: &str, config: &AlpacaConfig) -> Result<Self, BrokerError> {
        if key_id.is_empty() || secret_key.is_empty() {
            return Err(BrokerError::Auth("missing Alpaca API credentials".into()));
        }
        let client = AlpacaClient::new(
            key_id,
            secret_key,
            &config.base_url,
            &config.data_url,
            config.timeout,
        )?;
        info!("Alpaca broker using {}", config.base_url);
        Ok(Self { client })
    }

    /// Read credentials from the named environment variables.
    pub fn from_env(
        key_var: &str,
        secret_var: &str,
        config: &AlpacaConfig,
    ) -> Result<Self, BrokerError> {
        let key_id = std::env::var(key_var)
            .map_err(|_| BrokerError::Auth(format!("{key_var} is not set")))?;
        let secret = zeroize::Zeroizing::new(
            std::env::var(secret_var)
                .map_err(|_| BrokerError::Auth(format!("{secret_var} is not set")))?,
        );
        Self::new(&key_id, &secret, config)
    }
}

impl Broker for AlpacaBroker {
    fn account(&self) -> Result<Account, BrokerError> {
        self.client.account()?.into_account()
    }

    fn last_quote(&self, ticker: &Ticker) -> Result<Quote, BrokerError> {
        self.client.latest_quote(ticker.as_str())?.into_quote(ticker)
    }

    fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        self.client
            .positions()?
            .into_iter()
            .map(|p| p.into_position())
            .collect()
    }

    fn place_order(&self, request: &OrderRequest) -> Result<Order, BrokerError> {
        let body = NewOrder {
            symbol: request.ticker.as_str(),
            qty: request.quantity.normalize().to_string(),
            side: request.side.as_str(),
            order_type: request.order_type.as_str(),
            time_in_force: request.time_in_force.as_str(),
            client_order_id: &request.client_order_id,
        };
        self.client
            .submit_order(&body)
            .and_then(|resp| resp.into_order())
            .or_else(|e| {
                recover_duplicate(e, || self.order_by_client_id(&request.client_order_id))
            })
    }

    fn order(&self, order_id: &str) -> Result<Order, BrokerError> {
        self.client.order(order_id)?.into_order()
    }

    fn order_by_client_id(&self, client_order_id: &str) -> Result<Order, BrokerError> {
        self.client.order_by_client_id(client_order_id)?.into_order()
    }
}

/// A 422 on submit covers a reused client_order_id. If the broker already
/// holds an order under that id it is ours; otherwise keep the original error.
fn recover_duplicate(
    err: BrokerError,
    lookup: impl FnOnce() -> Result<Order, BrokerError>,
) -> Result<Order, BrokerError> {
    if !matches!(err, BrokerError::Order(_)) {
        return Err(err);
    }
    match lookup() {
        Ok(existing) => {
            warn!(
                "Order {} already submitted as {}, returning existing order",
                existing.client_order_id, existing.id
            );
            Ok(existing)
        }
        Err(_) => Err(err),
    }
}
