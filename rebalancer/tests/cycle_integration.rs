//! Integration tests for the rebalance cycle against the mock broker.

use rust_decimal_macros::dec;
use tranche::{Phase, RecordStatus, Ticker};
use tranche_broker::OrderStatus;
use tranche_broker::mock::{MockBroker, PlaceFailure};
use tranche_rebalancer::audit::AuditLog;
use tranche_rebalancer::config::Config;
use tranche_rebalancer::error::Error;
use tranche_rebalancer::execution::{CycleSummary, run_cycle};
use tranche_rebalancer::executor::BuyOutcome;
use tranche_rebalancer::reconcile::ReconciliationEngine;
use tranche_rebalancer::store::{JsonlStore, MemoryStore, RecordStore};

const TABLE: &str = "trade_records";

fn config(max_investment: &str) -> Config {
    let mut config = Config::parse(
        r#"
[allocation]
max_investment = "0"
weights = { SPY = 80, VBD = 20 }
"#,
    )
    .unwrap();
    config.allocation.max_investment = max_investment.into();
    config
}

fn broker() -> MockBroker {
    MockBroker::builder()
        .with_account("acct-1", dec!(5000))
        .with_quote("SPY", dec!(400), dec!(400.10))
        .with_quote("VBD", dec!(80), dec!(80.05))
        .build()
}

fn sink() -> AuditLog {
    AuditLog::with_writer(Box::new(std::io::sink()))
}

fn cycle(
    broker: &MockBroker,
    store: &dyn RecordStore,
    config: &Config,
) -> Result<CycleSummary, Error> {
    run_cycle(broker, store, config, &mut sink(), false, |_| Ok(true))
}

fn t(s: &str) -> Ticker {
    Ticker::new(s).unwrap()
}

fn fill_all(broker: &MockBroker) {
    for order in broker.orders() {
        broker.set_order_status(&order.id, OrderStatus::Filled).unwrap();
    }
}

// ============================================================================
// Happy path
// ============================================================================

#[test]
fn first_cycle_buys_target_split() {
    let broker = broker();
    let store = MemoryStore::new();

    let summary = cycle(&broker, &store, &config("1000")).unwrap();
    assert_eq!(summary.amount_to_invest, dec!(1000));
    assert_eq!(summary.deltas[&t("SPY")], dec!(800));
    assert_eq!(summary.deltas[&t("VBD")], dec!(200));
    assert_eq!(summary.submitted(), 2);

    let sent = broker.submitted_orders();
    assert_eq!(sent.len(), 2);
    let spy = sent.iter().find(|o| o.ticker == t("SPY")).unwrap();
    let vbd = sent.iter().find(|o| o.ticker == t("VBD")).unwrap();
    assert_eq!(spy.quantity, dec!(2));
    assert_eq!(vbd.quantity, dec!(2));

    let records = store.records(TABLE);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.phase() == Phase::Submitted));
}

#[test]
fn investment_is_capped_by_cash() {
    let broker = MockBroker::builder()
        .with_account("acct-1", dec!(500))
        .with_quote("SPY", dec!(100), dec!(100))
        .with_quote("VBD", dec!(50), dec!(50))
        .build();
    let store = MemoryStore::new();

    let summary = cycle(&broker, &store, &config("1000")).unwrap();
    assert_eq!(summary.amount_to_invest, dec!(500));
    assert_eq!(summary.deltas[&t("SPY")], dec!(400));
    assert_eq!(summary.deltas[&t("VBD")], dec!(100));
}

#[test]
fn small_delta_is_skipped_not_failed() {
    let broker = MockBroker::builder()
        .with_account("acct-1", dec!(5000))
        .with_quote("SPY", dec!(326.35), dec!(326.41))
        .with_quote("VBD", dec!(80), dec!(80))
        .build();
    let store = MemoryStore::new();

    // $100: SPY gets $80, less than one share
    let summary = cycle(&broker, &store, &config("100")).unwrap();
    assert_eq!(summary.submitted(), 0);
    assert_eq!(summary.skipped(), 2);
    assert!(summary
        .outcomes
        .iter()
        .all(|(_, _, o)| matches!(o, BuyOutcome::Skipped { .. })));
    assert!(broker.submitted_orders().is_empty());
    assert!(store.records(TABLE).is_empty());
}

// ============================================================================
// Reconciliation gates the next cycle
// ============================================================================

#[test]
fn open_orders_block_next_cycle() {
    let broker = broker();
    let store = MemoryStore::new();
    let config = config("1000");
    cycle(&broker, &store, &config).unwrap();

    let err = cycle(&broker, &store, &config).unwrap_err();
    let Error::ReconciliationPending { pending } = &err else {
        panic!("expected pending, got {err:?}");
    };
    assert_eq!(pending.len(), 2);
    assert_eq!(err.exit_code(), 3);
    assert_eq!(broker.submitted_orders().len(), 2, "no new orders while pending");

    fill_all(&broker);
    let summary = cycle(&broker, &store, &config).unwrap();
    assert_eq!(summary.reconcile.reconciled.len(), 2);
    assert_eq!(summary.submitted(), 2);
    assert_eq!(store.records(TABLE).len(), 4);
}

#[test]
fn terminal_record_persisted_even_when_another_is_pending() {
    let broker = broker();
    let store = MemoryStore::new();
    let config = config("1000");
    cycle(&broker, &store, &config).unwrap();

    let orders = broker.orders();
    broker.set_order_status(&orders[0].id, OrderStatus::Filled).unwrap();

    let err = cycle(&broker, &store, &config).unwrap_err();
    match err {
        Error::ReconciliationPending { pending } => assert_eq!(pending, vec![orders[1].id.clone()]),
        other => panic!("unexpected {other:?}"),
    }

    let closed = store.get(TABLE, &orders[0].client_order_id).unwrap();
    assert_eq!(closed.status(), RecordStatus::Reconciled);
    let open = store.get(TABLE, &orders[1].client_order_id).unwrap();
    assert_eq!(open.status(), RecordStatus::Unreconciled);
}

#[test]
fn reconcile_twice_is_idempotent() {
    let broker = broker();
    let store = MemoryStore::new();
    cycle(&broker, &store, &config("1000")).unwrap();
    let orders = broker.orders();
    broker.set_order_status(&orders[0].id, OrderStatus::Rejected).unwrap();

    let engine = ReconciliationEngine::new(&broker, &store, TABLE, 100);
    let first = engine.reconcile().unwrap();
    let reconciled_at = store
        .get(TABLE, &orders[0].client_order_id)
        .unwrap()
        .reconciled_at();

    let second = engine.reconcile().unwrap();
    assert_eq!(first.reconciled.len(), 1);
    assert!(second.reconciled.is_empty());
    assert_eq!(first.pending, second.pending);
    assert_eq!(
        store.get(TABLE, &orders[0].client_order_id).unwrap().reconciled_at(),
        reconciled_at
    );
}

// ============================================================================
// Failure windows
// ============================================================================

#[test]
fn failed_first_write_places_no_order() {
    let broker = broker();
    let store = MemoryStore::new();
    store.fail_put_after(0);

    let err = cycle(&broker, &store, &config("1000")).unwrap_err();
    assert!(matches!(err, Error::Store { .. }));
    assert!(broker.submitted_orders().is_empty());
}

#[test]
fn failed_second_write_is_healed_by_reconciliation() {
    let broker = broker();
    let store = MemoryStore::new();
    let config = config("1000");
    store.fail_put_after(1);

    let err = cycle(&broker, &store, &config).unwrap_err();
    assert!(matches!(err, Error::Store { .. }));
    let order = broker.orders()[0].clone();
    let rec = store.get(TABLE, &order.client_order_id).unwrap();
    assert_eq!(rec.phase(), Phase::Created);

    // next run finds the order by client id and waits for it
    let err = cycle(&broker, &store, &config).unwrap_err();
    assert!(matches!(err, Error::ReconciliationPending { .. }));
    let rec = store.get(TABLE, &order.client_order_id).unwrap();
    assert_eq!(rec.broker_order_id(), order.id);

    broker.set_order_status(&order.id, OrderStatus::Filled).unwrap();
    let summary = cycle(&broker, &store, &config).unwrap();
    assert_eq!(summary.reconcile.reconciled, vec![order.id]);
}

#[test]
fn lost_broker_response_does_not_duplicate_order() {
    let broker = broker();
    let store = MemoryStore::new();
    let config = config("1000");
    broker.fail_next_placement(PlaceFailure::ResponseLost);

    let err = cycle(&broker, &store, &config).unwrap_err();
    assert!(matches!(err, Error::Broker { .. }));
    assert_eq!(broker.orders().len(), 1);

    let engine = ReconciliationEngine::new(&broker, &store, TABLE, 100);
    let report = engine.reconcile().unwrap();
    assert_eq!(report.pending, vec![broker.orders()[0].id.clone()]);
    assert_eq!(broker.orders().len(), 1);
}

#[test]
fn refused_order_record_is_abandoned() {
    let broker = broker();
    let store = MemoryStore::new();
    let config = config("1000");
    broker.fail_next_placement(PlaceFailure::Refused);

    assert!(cycle(&broker, &store, &config).is_err());
    let records = store.records(TABLE);
    assert_eq!(records.len(), 1);

    let summary = cycle(&broker, &store, &config).unwrap();
    assert_eq!(summary.reconcile.abandoned, vec![records[0].id().to_string()]);
    assert_eq!(summary.submitted(), 2);
}

#[test]
fn broker_outage_aborts_before_planning() {
    let broker = broker();
    let store = MemoryStore::new();
    broker.set_unavailable(true);
    let err = cycle(&broker, &store, &config("1000")).unwrap_err();
    assert!(matches!(err, Error::Broker { .. }));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn invalid_config_touches_nothing() {
    let broker = broker();
    let store = MemoryStore::new();
    let err = cycle(&broker, &store, &config("a lot")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(broker.submitted_orders().is_empty());
    assert_eq!(broker.lookup_count(), 0);
}

// ============================================================================
// Sales
// ============================================================================

fn audit_events(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["event"].as_str().unwrap().to_string()
        })
        .collect()
}

#[test]
fn overweight_holding_is_audited_not_sold() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let broker = MockBroker::builder()
        .with_account("acct-1", dec!(5000))
        .with_position("SPY", dec!(10), dec!(5000))
        .with_quote("SPY", dec!(500), dec!(500.10))
        .with_quote("VBD", dec!(80), dec!(80.05))
        .build();
    let store = MemoryStore::new();

    // total 6000: SPY wants 4800 (-200), VBD wants 1200
    let summary = {
        let mut audit = AuditLog::open(&audit_path).unwrap();
        run_cycle(&broker, &store, &config("1000"), &mut audit, false, |_| Ok(true)).unwrap()
    };
    assert_eq!(summary.deltas, [(t("VBD"), dec!(1000))].into_iter().collect());
    assert_eq!(summary.unsold, [(t("SPY"), dec!(-200))].into_iter().collect());

    let sent = broker.submitted_orders();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ticker, t("VBD"));
    assert_eq!(sent[0].quantity, dec!(12));

    let events = audit_events(&audit_path);
    assert!(events.contains(&"sale_not_supported".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("run_completed"));
}

// ============================================================================
// Dry run and confirmation
// ============================================================================

#[test]
fn dry_run_places_nothing_and_audits_deltas() {
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");
    let broker = broker();
    let store = MemoryStore::new();

    {
        let mut audit = AuditLog::open(&audit_path).unwrap();
        let summary = run_cycle(&broker, &store, &config("1000"), &mut audit, true, |_| {
            panic!("dry run must not ask for approval")
        })
        .unwrap();
        assert_eq!(summary.deltas.len(), 2);
        assert!(summary.outcomes.is_empty());
    }

    assert!(broker.submitted_orders().is_empty());
    assert!(store.records(TABLE).is_empty());

    assert_eq!(
        audit_events(&audit_path),
        [
            "run_started",
            "reconcile_completed",
            "deltas_computed",
            "dry_run_delta",
            "dry_run_delta",
            "run_completed"
        ]
    );
}

#[test]
fn declined_run_places_nothing() {
    let broker = broker();
    let store = MemoryStore::new();
    let summary = run_cycle(&broker, &store, &config("1000"), &mut sink(), false, |deltas| {
        assert_eq!(deltas.len(), 2);
        Ok(false)
    })
    .unwrap();
    assert!(summary.declined);
    assert!(broker.submitted_orders().is_empty());
}

// ============================================================================
// File-backed store
// ============================================================================

#[test]
fn jsonl_store_carries_records_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let broker = broker();
    let config = config("1000");

    {
        let store = JsonlStore::open(dir.path()).unwrap();
        cycle(&broker, &store, &config).unwrap();
    }
    fill_all(&broker);

    let store = JsonlStore::open(dir.path()).unwrap();
    assert_eq!(store.scan_unreconciled(TABLE, 10).unwrap().len(), 2);
    let summary = cycle(&broker, &store, &config).unwrap();
    assert_eq!(summary.reconcile.reconciled.len(), 2);
    assert_eq!(store.scan_unreconciled(TABLE, 10).unwrap().len(), 2);
}
