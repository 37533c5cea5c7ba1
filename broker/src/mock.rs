//! Mock broker for testing: implements the `Broker` trait with scripted behavior.
//!
//! Use this in integration tests to simulate broker responses without network calls.
//!
//! ```
//! use tranche_broker::mock::{FillMode, MockBroker};
//! use tranche_broker::Broker;
//! use tranche::{Decimal, Ticker};
//!
//! let broker = MockBroker::builder()
//!     .fill_mode(FillMode::Accept)
//!     .with_account("acct-1", Decimal::new(5_000_00, 2))
//!     .with_quote("SPY", Decimal::new(326_35, 2), Decimal::new(326_41, 2))
//!     .build();
//!
//! let quote = broker.last_quote(&Ticker::new("SPY").unwrap()).unwrap();
//! assert_eq!(quote.bid, Decimal::new(326_35, 2));
//! ```

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use tranche::Ticker;
use uuid::Uuid;

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;

/// How the mock broker handles submitted orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillMode {
    /// Orders are accepted and stay open until `set_order_status` moves them.
    Accept,
    /// Orders are immediately fully filled.
    ImmediateFill,
    /// All orders are rejected at submission.
    Reject,
}

/// One-shot failure applied to the next `place_order` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceFailure {
    /// The broker refuses the request; no order is created.
    Refused,
    /// The order is created but the caller sees a connection error.
    ResponseLost,
}

/// Builder for `MockBroker`.
pub struct MockBrokerBuilder {
    fill_mode: FillMode,
    account_id: String,
    cash: Decimal,
    positions: Vec<Position>,
    quotes: FxHashMap<Ticker, Quote>,
    orders: Vec<Order>,
}

fn ticker(symbol: &str) -> Ticker {
    match Ticker::new(symbol) {
        Ok(t) => t,
        Err(e) => panic!("mock broker: invalid ticker {symbol:?}: {e}"),
    }
}

impl MockBrokerBuilder {
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    pub fn with_account(mut self, id: &str, cash: Decimal) -> Self {
        self.account_id = id.to_string();
        self.cash = cash;
        self
    }

    /// # Panics
    ///
    /// Panics if `symbol` is not a valid ticker.
    pub fn with_position(mut self, symbol: &str, quantity: Decimal, market_value: Decimal) -> Self {
        self.positions.push(Position {
            ticker: ticker(symbol),
            quantity,
            market_value,
        });
        self
    }

    /// # Panics
    ///
    /// Panics if `symbol` is not a valid ticker.
    pub fn with_quote(mut self, symbol: &str, bid: Decimal, ask: Decimal) -> Self {
        let t = ticker(symbol);
        self.quotes.insert(t.clone(), Quote { ticker: t, bid, ask });
        self
    }

    /// Seed an order the broker already knows about.
    pub fn with_order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn build(self) -> MockBroker {
        let mut state = MockState::default();
        for order in self.orders {
            state.insert(order);
        }
        MockBroker {
            fill_mode: self.fill_mode,
            account_id: self.account_id,
            cash: self.cash,
            positions: self.positions,
            quotes: self.quotes,
            state: Mutex::new(state),
        }
    }
}

#[derive(Default)]
struct MockState {
    orders: Vec<Order>,
    by_id: FxHashMap<String, usize>,
    by_client_id: FxHashMap<String, usize>,
    requests: Vec<OrderRequest>,
    next_failure: Option<PlaceFailure>,
    unavailable: bool,
    lookups: usize,
}

impl MockState {
    fn insert(&mut self, order: Order) -> usize {
        let idx = self.orders.len();
        self.by_id.insert(order.id.clone(), idx);
        self.by_client_id.insert(order.client_order_id.clone(), idx);
        self.orders.push(order);
        idx
    }
}

/// A mock broker that records submitted orders and returns configurable responses.
///
/// Client order ids are honored as idempotency keys: resubmitting a known id
/// returns the existing order instead of creating a new one.
pub struct MockBroker {
    fill_mode: FillMode,
    account_id: String,
    cash: Decimal,
    positions: Vec<Position>,
    quotes: FxHashMap<Ticker, Quote>,
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn builder() -> MockBrokerBuilder {
        MockBrokerBuilder {
            fill_mode: FillMode::Accept,
            account_id: "mock-account".to_string(),
            cash: Decimal::ZERO,
            positions: Vec::new(),
            quotes: FxHashMap::default(),
            orders: Vec::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        if self.state().unavailable {
            return Err(BrokerError::Connection("mock: broker unavailable".into()));
        }
        Ok(())
    }

    /// Every request passed to `place_order`, including refused ones.
    pub fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.state().requests.clone()
    }

    /// Orders the broker actually holds.
    pub fn orders(&self) -> Vec<Order> {
        self.state().orders.clone()
    }

    /// Number of `order` and `order_by_client_id` calls served.
    pub fn lookup_count(&self) -> usize {
        self.state().lookups
    }

    /// Make the next `place_order` call fail.
    pub fn fail_next_placement(&self, failure: PlaceFailure) {
        self.state().next_failure = Some(failure);
    }

    /// Fail every call with a connection error while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Move an existing order to `status`. Filled orders get their full quantity.
    pub fn set_order_status(&self, order_id: &str, status: OrderStatus) -> Result<(), BrokerError> {
        let mut state = self.state();
        let idx = *state
            .by_id
            .get(order_id)
            .ok_or_else(|| BrokerError::OrderNotFound(order_id.to_string()))?;
        let order = &mut state.orders[idx];
        if status == OrderStatus::Filled {
            order.filled_quantity = order.quantity;
        }
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Remove an order, as if the broker had purged it.
    pub fn forget_order(&self, order_id: &str) {
        let mut state = self.state();
        // Indices stay valid: the slot is kept, only the lookups go.
        if let Some(idx) = state.by_id.remove(order_id) {
            let client_id = state.orders[idx].client_order_id.clone();
            state.by_client_id.remove(&client_id);
        }
    }
}

impl Broker for MockBroker {
    fn account(&self) -> Result<Account, BrokerError> {
        self.check_available()?;
        let held: Decimal = self.positions.iter().map(|p| p.market_value).sum();
        Ok(Account {
            id: self.account_id.clone(),
            cash: self.cash,
            equity: self.cash + held,
        })
    }

    fn last_quote(&self, ticker: &Ticker) -> Result<Quote, BrokerError> {
        self.check_available()?;
        self.quotes
            .get(ticker)
            .cloned()
            .ok_or_else(|| BrokerError::InvalidSymbol(ticker.to_string()))
    }

    fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        self.check_available()?;
        Ok(self.positions.clone())
    }

    fn place_order(&self, request: &OrderRequest) -> Result<Order, BrokerError> {
        self.check_available()?;
        let mut state = self.state();
        state.requests.push(request.clone());

        if let Some(&idx) = state.by_client_id.get(&request.client_order_id) {
            return Ok(state.orders[idx].clone());
        }

        let failure = state.next_failure.take();
        if failure == Some(PlaceFailure::Refused) {
            return Err(BrokerError::Order("mock: order refused".into()));
        }

        let (status, filled_quantity) = match self.fill_mode {
            FillMode::Reject => return Err(BrokerError::Order("mock: order rejected".into())),
            FillMode::Accept => (OrderStatus::Accepted, Decimal::ZERO),
            FillMode::ImmediateFill => (OrderStatus::Filled, request.quantity),
        };

        let order = Order {
            id: Uuid::new_v4().to_string(),
            client_order_id: request.client_order_id.clone(),
            ticker: request.ticker.clone(),
            status,
            quantity: request.quantity,
            filled_quantity,
            side: request.side,
            updated_at: Utc::now(),
        };
        state.insert(order.clone());

        if failure == Some(PlaceFailure::ResponseLost) {
            return Err(BrokerError::Connection("mock: response lost".into()));
        }
        Ok(order)
    }

    fn order(&self, order_id: &str) -> Result<Order, BrokerError> {
        self.check_available()?;
        let mut state = self.state();
        state.lookups += 1;
        state
            .by_id
            .get(order_id)
            .map(|&idx| state.orders[idx].clone())
            .ok_or_else(|| BrokerError::OrderNotFound(order_id.to_string()))
    }

    fn order_by_client_id(&self, client_order_id: &str) -> Result<Order, BrokerError> {
        self.check_available()?;
        let mut state = self.state();
        state.lookups += 1;
        state
            .by_client_id
            .get(client_order_id)
            .map(|&idx| state.orders[idx].clone())
            .ok_or_else(|| BrokerError::OrderNotFound(client_order_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spy() -> Ticker {
        Ticker::new("SPY").unwrap()
    }

    fn buy(client_id: &str, qty: Decimal) -> OrderRequest {
        OrderRequest::market_day("acct-1", spy(), qty, Side::Buy, client_id)
    }

    #[test]
    fn builder_basic() {
        let broker = MockBroker::builder()
            .with_account("acct-1", dec!(1000))
            .with_position("SPY", dec!(2), dec!(650))
            .with_quote("SPY", dec!(325), dec!(326))
            .build();

        let account = broker.account().unwrap();
        assert_eq!(account.id, "acct-1");
        assert_eq!(account.cash, dec!(1000));
        assert_eq!(account.equity, dec!(1650));

        let positions = broker.positions().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].ticker, spy());

        let quote = broker.last_quote(&spy()).unwrap();
        assert_eq!(quote.bid, dec!(325));
    }

    #[test]
    fn unknown_quote_is_invalid_symbol() {
        let broker = MockBroker::builder().build();
        let err = broker.last_quote(&Ticker::new("QQQ").unwrap()).unwrap_err();
        assert!(matches!(err, BrokerError::InvalidSymbol(_)));
    }

    #[test]
    fn submit_records_orders() {
        let broker = MockBroker::builder().build();
        let order = broker.place_order(&buy("rec-1", dec!(9))).unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        assert_eq!(order.client_order_id, "rec-1");

        let recorded = broker.submitted_orders();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].quantity, dec!(9));

        assert_eq!(broker.order(&order.id).unwrap().id, order.id);
        assert_eq!(broker.order_by_client_id("rec-1").unwrap().id, order.id);
        assert_eq!(broker.lookup_count(), 2);
    }

    #[test]
    fn client_id_is_idempotent() {
        let broker = MockBroker::builder().build();
        let first = broker.place_order(&buy("rec-1", dec!(9))).unwrap();
        let second = broker.place_order(&buy("rec-1", dec!(9))).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(broker.orders().len(), 1);
        assert_eq!(broker.submitted_orders().len(), 2);
    }

    #[test]
    fn reject_mode() {
        let broker = MockBroker::builder().fill_mode(FillMode::Reject).build();
        assert!(broker.place_order(&buy("rec-1", dec!(1))).is_err());
        assert!(broker.orders().is_empty());
    }

    #[test]
    fn immediate_fill() {
        let broker = MockBroker::builder()
            .fill_mode(FillMode::ImmediateFill)
            .build();
        let order = broker.place_order(&buy("rec-1", dec!(4))).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_quantity, dec!(4));
    }

    #[test]
    fn lost_response_still_creates_order() {
        let broker = MockBroker::builder().build();
        broker.fail_next_placement(PlaceFailure::ResponseLost);
        let err = broker.place_order(&buy("rec-1", dec!(1))).unwrap_err();
        assert!(matches!(err, BrokerError::Connection(_)));
        assert!(broker.order_by_client_id("rec-1").is_ok());
        // one-shot
        assert!(broker.place_order(&buy("rec-2", dec!(1))).is_ok());
    }

    #[test]
    fn refused_creates_nothing() {
        let broker = MockBroker::builder().build();
        broker.fail_next_placement(PlaceFailure::Refused);
        assert!(broker.place_order(&buy("rec-1", dec!(1))).is_err());
        assert!(broker.order_by_client_id("rec-1").unwrap_err().is_not_found());
    }

    #[test]
    fn status_updates() {
        let broker = MockBroker::builder().build();
        let order = broker.place_order(&buy("rec-1", dec!(3))).unwrap();
        broker.set_order_status(&order.id, OrderStatus::Filled).unwrap();
        let updated = broker.order(&order.id).unwrap();
        assert!(updated.status.is_terminal());
        assert_eq!(updated.filled_quantity, dec!(3));

        assert!(broker.set_order_status("nope", OrderStatus::Filled).is_err());
    }

    #[test]
    fn unavailable_fails_everything() {
        let broker = MockBroker::builder().build();
        broker.set_unavailable(true);
        assert!(matches!(broker.account(), Err(BrokerError::Connection(_))));
        assert!(broker.positions().is_err());
        broker.set_unavailable(false);
        assert!(broker.positions().is_ok());
    }

    #[test]
    fn forgotten_order_is_not_found() {
        let broker = MockBroker::builder().build();
        let order = broker.place_order(&buy("rec-1", dec!(1))).unwrap();
        broker.forget_order(&order.id);
        assert!(broker.order(&order.id).unwrap_err().is_not_found());
    }
}
