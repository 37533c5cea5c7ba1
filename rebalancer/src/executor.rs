//! Single-order execution around a durable trade record.
//!
//! The record is written before the broker sees the order and updated after
//! the broker accepts it. The record id is the broker client-order-id, so a
//! failure between the two writes is recoverable by reconciliation.

use chrono::Utc;
use log::{info, warn};
use tranche::{AllocationError, Decimal, Ticker, TradeRecord};
use tranche_broker::{Broker, BrokerError, OrderRequest, Side};

use crate::error::{Error, Result};
use crate::store::RecordStore;

/// Result of one [`OrderExecutor::buy`].
#[derive(Debug, Clone, PartialEq)]
pub enum BuyOutcome {
    /// The amount does not cover one share; nothing was written or sent.
    Skipped { price: Decimal },
    Submitted {
        record_id: String,
        broker_order_id: String,
        quantity: Decimal,
        price: Decimal,
    },
}

pub struct OrderExecutor<'a> {
    broker: &'a dyn Broker,
    store: &'a dyn RecordStore,
    table: String,
}

impl<'a> OrderExecutor<'a> {
    pub fn new(broker: &'a dyn Broker, store: &'a dyn RecordStore, table: &str) -> Self {
        Self {
            broker,
            store,
            table: table.to_string(),
        }
    }

    /// Buy as many whole shares of `ticker` as `dollar_amount` covers at the bid.
    pub fn buy(&self, ticker: &Ticker, dollar_amount: Decimal) -> Result<BuyOutcome> {
        let account = self
            .broker
            .account()
            .map_err(|e| Error::broker("account", e))?;
        let quote = self
            .broker
            .last_quote(ticker)
            .map_err(|e| Error::broker(format!("last_quote {ticker}"), e))?;

        let price = quote.price_for(Side::Buy);
        if price <= Decimal::ZERO {
            return Err(Error::broker(
                format!("last_quote {ticker}"),
                BrokerError::Parse(format!("non-positive bid {price}")),
            ));
        }

        let quantity = dollar_amount
            .checked_div(price)
            .ok_or(AllocationError::Overflow("order quantity"))?
            .floor();
        if quantity < Decimal::ONE {
            warn!("Skipping {ticker}: ${dollar_amount} buys less than one share at ${price}");
            return Ok(BuyOutcome::Skipped { price });
        }

        let mut record = TradeRecord::new(ticker.clone(), quantity);
        self.store
            .put(&self.table, &record)
            .map_err(|e| Error::store(format!("put {}", record.id()), e))?;

        let request = OrderRequest::market_day(
            &account.id,
            ticker.clone(),
            quantity,
            Side::Buy,
            record.id(),
        );
        let order = self
            .broker
            .place_order(&request)
            .map_err(|e| Error::broker(format!("place_order {}", record.id()), e))?;

        record.mark_submitted(&order.id, Utc::now())?;
        self.store.put(&self.table, &record).map_err(|e| {
            Error::store(
                format!("put {} after broker order {}", record.id(), order.id),
                e,
            )
        })?;

        info!(
            "Submitted buy of {quantity} {ticker} at ~${price} (record {}, order {})",
            record.id(),
            order.id
        );
        Ok(BuyOutcome::Submitted {
            record_id: record.id().to_string(),
            broker_order_id: order.id,
            quantity,
            price,
        })
    }
}
