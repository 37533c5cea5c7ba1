//! JSONL audit trail logging.
//!
//! Each rebalancer run appends events to an audit.jsonl file,
//! one JSON object per line, flushed as it is written.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tranche::{Decimal, Deltas, Ticker};

use crate::error::Result;
use crate::executor::BuyOutcome;
use crate::reconcile::ReconcileReport;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<Box<dyn Write>>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_writer(Box::new(file)))
    }

    /// Log to an arbitrary sink, e.g. `io::sink()` for previews.
    pub fn with_writer(writer: Box<dyn Write>) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }
}

fn deltas_json(deltas: &Deltas) -> serde_json::Value {
    deltas
        .iter()
        .map(|(t, d)| (t.to_string(), serde_json::Value::String(d.to_string())))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

pub fn log_run_started(
    audit: &mut AuditLog,
    account_id: &str,
    max_investment: Decimal,
    dry_run: bool,
) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "account": account_id,
            "max_investment": max_investment.to_string(),
            "dry_run": dry_run,
        }),
    )
}

pub fn log_reconcile(audit: &mut AuditLog, report: &ReconcileReport) -> Result<()> {
    let data = serde_json::to_value(report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    audit.log("reconcile_completed", data)
}

pub fn log_deltas(audit: &mut AuditLog, amount_to_invest: Decimal, deltas: &Deltas) -> Result<()> {
    audit.log(
        "deltas_computed",
        serde_json::json!({
            "amount_to_invest": amount_to_invest.to_string(),
            "deltas": deltas_json(deltas),
        }),
    )
}

pub fn log_buy(
    audit: &mut AuditLog,
    ticker: &Ticker,
    amount: Decimal,
    outcome: &BuyOutcome,
) -> Result<()> {
    match outcome {
        BuyOutcome::Skipped { price } => audit.log(
            "order_skipped",
            serde_json::json!({
                "ticker": ticker.as_str(),
                "amount": amount.to_string(),
                "price": price.to_string(),
            }),
        ),
        BuyOutcome::Submitted {
            record_id,
            broker_order_id,
            quantity,
            price,
        } => audit.log(
            "order_submitted",
            serde_json::json!({
                "ticker": ticker.as_str(),
                "amount": amount.to_string(),
                "record_id": record_id,
                "broker_order_id": broker_order_id,
                "quantity": quantity.to_string(),
                "price": price.to_string(),
            }),
        ),
    }
}

pub fn log_dry_run_delta(audit: &mut AuditLog, ticker: &Ticker, delta: Decimal) -> Result<()> {
    audit.log(
        "dry_run_delta",
        serde_json::json!({ "ticker": ticker.as_str(), "delta": delta.to_string() }),
    )
}

pub fn log_sale_not_supported(audit: &mut AuditLog, ticker: &Ticker, delta: Decimal) -> Result<()> {
    audit.log(
        "sale_not_supported",
        serde_json::json!({ "ticker": ticker.as_str(), "delta": delta.to_string() }),
    )
}

pub fn log_run_declined(audit: &mut AuditLog, pending_buys: usize) -> Result<()> {
    audit.log("run_declined", serde_json::json!({ "pending_buys": pending_buys }))
}

pub fn log_run_completed(audit: &mut AuditLog, submitted: usize, skipped: usize) -> Result<()> {
    audit.log(
        "run_completed",
        serde_json::json!({
            "submitted": submitted,
            "skipped": skipped,
        }),
    )
}
