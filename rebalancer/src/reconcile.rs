//! Reconciliation: close trade records whose broker orders reached a
//! terminal status.

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use tranche::{TradeRecord, Transition};
use tranche_broker::{Broker, Order};

use crate::error::{Error, Result};
use crate::store::RecordStore;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Broker order ids whose records were closed this pass.
    pub reconciled: Vec<String>,
    /// Record ids closed because their order never reached the broker.
    pub abandoned: Vec<String>,
    /// Broker order ids still open at the broker.
    pub pending: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.pending.is_empty()
    }

    /// `Err(ReconciliationPending)` if any order is still open.
    pub fn into_result(self) -> Result<Self> {
        if self.pending.is_empty() {
            Ok(self)
        } else {
            Err(Error::ReconciliationPending {
                pending: self.pending,
            })
        }
    }
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "RECONCILIATION:")?;
        writeln!(
            f,
            "  {:>10} {:>10} {:>10}",
            "Reconciled", "Abandoned", "Pending"
        )?;
        writeln!(
            f,
            "  {:>10} {:>10} {:>10}",
            self.reconciled.len(),
            self.abandoned.len(),
            self.pending.len()
        )?;
        for id in &self.pending {
            writeln!(f, "  pending: {id}")?;
        }
        for id in &self.abandoned {
            writeln!(f, "  abandoned record: {id}")?;
        }
        Ok(())
    }
}

/// Scans unreconciled records and advances them against broker order state.
pub struct ReconciliationEngine<'a> {
    broker: &'a dyn Broker,
    store: &'a dyn RecordStore,
    table: String,
    page_size: usize,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        broker: &'a dyn Broker,
        store: &'a dyn RecordStore,
        table: &str,
        page_size: usize,
    ) -> Self {
        Self {
            broker,
            store,
            table: table.to_string(),
            page_size,
        }
    }

    /// Run one pass. Every record that reaches a terminal state is persisted
    /// before this returns, even when others remain pending.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let records = self
            .store
            .scan_unreconciled(&self.table, self.page_size)
            .map_err(|e| Error::store(format!("scan {}", self.table), e))?;

        let mut report = ReconcileReport::default();
        if records.is_empty() {
            debug!("No unreconciled records");
            return Ok(report);
        }
        info!("Reconciling {} records", records.len());

        for mut record in records {
            let order = if record.broker_order_id().is_empty() {
                match self.recover_submission(&mut record)? {
                    Some(order) => order,
                    None => {
                        report.abandoned.push(record.id().to_string());
                        continue;
                    }
                }
            } else {
                self.fetch_order(&record)?
            };

            if order.status.is_terminal() {
                if record.mark_reconciled(order.updated_at) == Transition::Applied {
                    self.persist(&record)?;
                }
                debug!("Order {} is {}", order.id, order.status);
                report.reconciled.push(order.id);
            } else {
                report.pending.push(order.id);
            }
        }

        info!(
            "Reconciliation: {} reconciled, {} abandoned, {} pending",
            report.reconciled.len(),
            report.abandoned.len(),
            report.pending.len()
        );
        Ok(report)
    }

    /// `reconcile()` that fails when anything is still pending.
    pub fn reconcile_strict(&self) -> Result<ReconcileReport> {
        self.reconcile()?.into_result()
    }

    /// The record was written but never marked submitted. Ask the broker
    /// whether it knows the record id as a client order id.
    fn recover_submission(&self, record: &mut TradeRecord) -> Result<Option<Order>> {
        match self.broker.order_by_client_id(record.id()) {
            Ok(order) => {
                warn!(
                    "Record {} was never marked submitted; broker has order {}",
                    record.id(),
                    order.id
                );
                record.mark_submitted(&order.id, Utc::now())?;
                self.persist(record)?;
                Ok(Some(order))
            }
            Err(e) if e.is_not_found() => {
                warn!("Record {} never reached the broker; closing it", record.id());
                record.mark_reconciled(Utc::now());
                self.persist(record)?;
                Ok(None)
            }
            Err(e) => Err(Error::broker(format!("order_by_client_id {}", record.id()), e)),
        }
    }

    fn fetch_order(&self, record: &TradeRecord) -> Result<Order> {
        let id = record.broker_order_id();
        self.broker.order(id).map_err(|e| {
            if e.is_not_found() {
                Error::Data {
                    record_id: record.id().to_string(),
                    broker_order_id: id.to_string(),
                }
            } else {
                Error::broker(format!("order {id}"), e)
            }
        })
    }

    fn persist(&self, record: &TradeRecord) -> Result<()> {
        self.store
            .put(&self.table, record)
            .map_err(|e| Error::store(format!("put {}", record.id()), e))
    }
}
