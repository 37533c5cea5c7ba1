//! Broker-backed allocation planner.

use log::debug;
use tranche::{AllocationPlanner, Decimal, Deltas, Holdings};
use tranche_broker::Broker;

use crate::error::{Error, Result};

/// Fetches holdings and cash from the broker and delegates to the pure
/// [`AllocationPlanner`].
pub struct Portfolio<'a> {
    broker: &'a dyn Broker,
    planner: AllocationPlanner,
}

impl<'a> Portfolio<'a> {
    pub fn new(broker: &'a dyn Broker, planner: AllocationPlanner) -> Self {
        Self { broker, planner }
    }

    /// Current market value per ticker. Multiple positions in one ticker are summed.
    pub fn holdings(&self) -> Result<Holdings> {
        let positions = self
            .broker
            .positions()
            .map_err(|e| Error::broker("positions", e))?;
        let mut holdings = Holdings::new();
        for p in positions {
            let slot = holdings.entry(p.ticker).or_insert(Decimal::ZERO);
            *slot = slot
                .checked_add(p.market_value)
                .ok_or(tranche::AllocationError::Overflow("holdings"))?;
        }
        debug!("Fetched {} holdings", holdings.len());
        Ok(holdings)
    }

    /// `min(max_amount, cash)`, never negative.
    pub fn amount_to_invest(&self, max_amount: Decimal) -> Result<Decimal> {
        let account = self
            .broker
            .account()
            .map_err(|e| Error::broker("account", e))?;
        Ok(tranche::amount_to_invest(max_amount, account.cash))
    }

    pub fn deltas_with_sales(&self, amount_to_invest: Decimal) -> Result<Deltas> {
        let holdings = self.holdings()?;
        Ok(self.planner.deltas_with_sales(&holdings, amount_to_invest)?)
    }

    pub fn deltas_without_sales(&self, amount_to_invest: Decimal) -> Result<Deltas> {
        let holdings = self.holdings()?;
        Ok(self.planner.deltas_without_sales(&holdings, amount_to_invest)?)
    }
}
