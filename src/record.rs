//! Trade record: the durable unit of intent and outcome for one order.
//!
//! A record is written *before* its order is sent to the broker, updated
//! once the broker accepts it, and closed when reconciliation sees a
//! terminal broker status:
//!
//! ```text
//! created --mark_submitted--> submitted --mark_reconciled--> Reconciled
//!     \_______________________mark_reconciled________________/
//! (created and submitted are both Unreconciled)
//! ```
//!
//! Fields are private; the transition methods are the only way to change a
//! record, and `Reconciled` is terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::RecordError;
use crate::types::Ticker;

/// Persisted lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RecordStatus {
    Unreconciled,
    Reconciled,
}

impl RecordStatus {
    pub fn is_terminal(self) -> bool {
        self == RecordStatus::Reconciled
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Unreconciled => write!(f, "unreconciled"),
            RecordStatus::Reconciled => write!(f, "reconciled"),
        }
    }
}

/// Finer view of where a record is; derived, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Persisted, broker has not (yet) acknowledged an order.
    Created,
    /// Broker accepted the order; outcome unknown.
    Submitted,
    Reconciled,
}

/// Whether a transition changed the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Unchanged,
}

/// One attempted trade.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TradeRecord {
    id: String,
    ticker: Ticker,
    quantity: Decimal,
    #[cfg_attr(feature = "serde", serde(default))]
    broker_order_id: String,
    status: RecordStatus,
    created_at: DateTime<Utc>,
    #[cfg_attr(feature = "serde", serde(default))]
    submitted_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "serde", serde(default))]
    reconciled_at: Option<DateTime<Utc>>,
}

impl TradeRecord {
    /// A fresh `Unreconciled` record with a random UUID id.
    ///
    /// The id doubles as the broker client-order-id.
    pub fn new(ticker: Ticker, quantity: Decimal) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), ticker, quantity, Utc::now())
    }

    /// A fresh record with a caller-chosen id and creation time.
    pub fn with_id(
        id: impl Into<String>,
        ticker: Ticker,
        quantity: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            ticker,
            quantity,
            broker_order_id: String::new(),
            status: RecordStatus::Unreconciled,
            created_at,
            submitted_at: None,
            reconciled_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Empty until the broker accepts the order.
    pub fn broker_order_id(&self) -> &str {
        &self.broker_order_id
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn reconciled_at(&self) -> Option<DateTime<Utc>> {
        self.reconciled_at
    }

    pub fn phase(&self) -> Phase {
        match self.status {
            RecordStatus::Reconciled => Phase::Reconciled,
            RecordStatus::Unreconciled if self.broker_order_id.is_empty() => Phase::Created,
            RecordStatus::Unreconciled => Phase::Submitted,
        }
    }

    /// Record the broker's acceptance. Status stays `Unreconciled`.
    ///
    /// Re-marking with the same broker id is a no-op.
    pub fn mark_submitted(
        &mut self,
        broker_order_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Transition, RecordError> {
        if self.status.is_terminal() {
            return Err(RecordError::AlreadyReconciled(self.id.clone()));
        }
        if broker_order_id.is_empty() {
            return Err(RecordError::EmptyBrokerOrderId(self.id.clone()));
        }
        if !self.broker_order_id.is_empty() {
            if self.broker_order_id == broker_order_id {
                return Ok(Transition::Unchanged);
            }
            return Err(RecordError::BrokerOrderIdConflict {
                id: self.id.clone(),
                existing: self.broker_order_id.clone(),
                new: broker_order_id.to_string(),
            });
        }
        self.broker_order_id = broker_order_id.to_string();
        self.submitted_at = Some(at);
        Ok(Transition::Applied)
    }

    /// Close the record. Idempotent: a reconciled record is left untouched,
    /// including its original `reconciled_at`.
    pub fn mark_reconciled(&mut self, reconciled_at: DateTime<Utc>) -> Transition {
        if self.status.is_terminal() {
            return Transition::Unchanged;
        }
        self.status = RecordStatus::Reconciled;
        self.reconciled_at = Some(reconciled_at);
        Transition::Applied
    }

    /// Check a status edge without the side data. Only
    /// `Unreconciled -> Reconciled` (and self-loops) are legal.
    pub fn transition(&self, to: RecordStatus) -> Result<Transition, RecordError> {
        match (self.status, to) {
            (from, to) if from == to => Ok(Transition::Unchanged),
            (RecordStatus::Unreconciled, RecordStatus::Reconciled) => Ok(Transition::Applied),
            (from, to) => Err(RecordError::IllegalTransition {
                id: self.id.clone(),
                from,
                to,
            }),
        }
    }

    /// Check that a stored copy is a legal successor of `self`.
    ///
    /// Stores call this before overwriting so a stale writer can never
    /// reopen a reconciled record.
    pub fn check_successor(&self, next: &TradeRecord) -> Result<(), RecordError> {
        self.transition(next.status)?;
        if !self.broker_order_id.is_empty() && self.broker_order_id != next.broker_order_id {
            return Err(RecordError::BrokerOrderIdConflict {
                id: self.id.clone(),
                existing: self.broker_order_id.clone(),
                new: next.broker_order_id.clone(),
            });
        }
        Ok(())
    }
}
