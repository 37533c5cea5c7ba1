//! Execution orchestrator: reconcile → plan → buy.
//!
//! [`run_cycle`] is the whole rebalance against injected collaborators.
//! The `run`/`show_*`/`check_status` entry points wire it to the configured
//! Alpaca account, JSONL store and audit file, and print results.

use log::{info, warn};
use tranche::allocation::scale_buys_to_budget;
use tranche::{Decimal, Deltas, Ticker};
use tranche_broker::Broker;
use tranche_broker::alpaca::AlpacaBroker;

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{BuyOutcome, OrderExecutor};
use crate::portfolio::Portfolio;
use crate::reconcile::{ReconcileReport, ReconciliationEngine};
use crate::store::{JsonlStore, RecordStore};

/// Options for a rebalance run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Report deltas without placing orders.
    pub dry_run: bool,
    /// Ask the operator before placing orders.
    pub confirm: bool,
}

/// What one cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub reconcile: ReconcileReport,
    pub amount_to_invest: Decimal,
    pub deltas: Deltas,
    pub outcomes: Vec<(Ticker, Decimal, BuyOutcome)>,
    /// Sales the full rebalance wants but a buy-only run leaves alone.
    pub unsold: Deltas,
    /// The operator declined at the confirmation prompt.
    pub declined: bool,
}

impl CycleSummary {
    pub fn submitted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, _, o)| matches!(o, BuyOutcome::Submitted { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.submitted()
    }
}

/// One rebalance cycle.
///
/// Reconciliation runs first and any still-pending order aborts the cycle
/// with [`Error::ReconciliationPending`] before new orders are planned.
/// `approve` sees the buy-only deltas and may veto the buys.
pub fn run_cycle(
    broker: &dyn Broker,
    store: &dyn RecordStore,
    config: &Config,
    audit: &mut AuditLog,
    dry_run: bool,
    approve: impl FnOnce(&Deltas) -> Result<bool>,
) -> Result<CycleSummary> {
    let max_investment = config.max_investment()?;
    let planner = config.planner()?;

    let account = broker.account().map_err(|e| Error::broker("account", e))?;
    audit::log_run_started(audit, &account.id, max_investment, dry_run)?;

    let engine = ReconciliationEngine::new(
        broker,
        store,
        &config.store.table,
        config.store.page_size,
    );
    let report = engine.reconcile()?;
    audit::log_reconcile(audit, &report)?;
    let report = report.into_result()?;

    let portfolio = Portfolio::new(broker, planner);
    let amount_to_invest = portfolio.amount_to_invest(max_investment)?;
    let full = portfolio.deltas_with_sales(amount_to_invest)?;
    let deltas = scale_buys_to_budget(&full, amount_to_invest)?;
    audit::log_deltas(audit, amount_to_invest, &deltas)?;
    info!(
        "Investing ${amount_to_invest:.2} across {} tickers",
        deltas.len()
    );

    let mut summary = CycleSummary {
        reconcile: report,
        amount_to_invest,
        deltas,
        unsold: full.into_iter().filter(|(_, d)| *d < Decimal::ZERO).collect(),
        ..CycleSummary::default()
    };

    if dry_run {
        for (ticker, delta) in &summary.deltas {
            info!("DRY-RUN would have traded ${delta:.2} of {ticker}");
            audit::log_dry_run_delta(audit, ticker, *delta)?;
        }
        audit::log_run_completed(audit, 0, 0)?;
        return Ok(summary);
    }

    if !summary.deltas.is_empty() && !approve(&summary.deltas)? {
        info!("Run declined; no orders placed");
        audit::log_run_declined(audit, summary.deltas.len())?;
        summary.declined = true;
        return Ok(summary);
    }

    let executor = OrderExecutor::new(broker, store, &config.store.table);
    for (ticker, delta) in &summary.deltas {
        let outcome = executor.buy(ticker, *delta)?;
        audit::log_buy(audit, ticker, *delta, &outcome)?;
        summary.outcomes.push((ticker.clone(), *delta, outcome));
    }
    for (ticker, delta) in &summary.unsold {
        warn!(
            "Selling is not supported yet, not selling ${:.2} of {ticker}",
            delta.abs()
        );
        audit::log_sale_not_supported(audit, ticker, *delta)?;
    }

    audit::log_run_completed(audit, summary.submitted(), summary.skipped())?;
    Ok(summary)
}

/// Buy-only and with-sales deltas for the current account. Places nothing.
#[derive(Debug, Clone)]
pub struct Plan {
    pub amount_to_invest: Decimal,
    pub with_sales: Deltas,
    pub without_sales: Deltas,
}

pub fn plan(broker: &dyn Broker, config: &Config) -> Result<Plan> {
    let portfolio = Portfolio::new(broker, config.planner()?);
    let amount_to_invest = portfolio.amount_to_invest(config.max_investment()?)?;
    Ok(Plan {
        amount_to_invest,
        with_sales: portfolio.deltas_with_sales(amount_to_invest)?,
        without_sales: portfolio.deltas_without_sales(amount_to_invest)?,
    })
}

// === Entry points ===

/// Connect to the configured Alpaca account.
pub fn connect(config: &Config) -> Result<AlpacaBroker> {
    AlpacaBroker::from_env(
        &config.broker.key_env,
        &config.broker.secret_env,
        &config.broker.alpaca(),
    )
    .map_err(|e| Error::broker("connect", e))
}

pub fn open_store(config: &Config) -> Result<JsonlStore> {
    JsonlStore::open(&config.store_dir()).map_err(|e| Error::store("open", e))
}

/// Execute a full rebalance run.
pub fn run(config: &Config, opts: &RunOptions) -> Result<()> {
    let broker = connect(config)?;
    let store = open_store(config)?;
    let mut audit = AuditLog::open(&config.audit_path())?;
    let dry_run = opts.dry_run || config.run.dry_run;

    let summary = run_cycle(&broker, &store, config, &mut audit, dry_run, |deltas| {
        if !opts.confirm {
            return Ok(true);
        }
        display_deltas("BUY PLAN:", deltas);
        dialoguer::Confirm::new()
            .with_prompt("Place these orders?")
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))
    })?;

    if !summary.reconcile.reconciled.is_empty() || !summary.reconcile.abandoned.is_empty() {
        print!("{}", summary.reconcile);
    }
    if dry_run {
        display_deltas("[DRY RUN] Would buy:", &summary.deltas);
        return Ok(());
    }
    if summary.declined {
        println!("Aborted.");
        return Ok(());
    }

    display_outcomes(&summary);
    println!(
        "\n{} submitted, {} skipped. Audit logged to {}",
        summary.submitted(),
        summary.skipped(),
        config.audit_path().display()
    );
    Ok(())
}

/// Print the plan without reconciling or trading.
pub fn show_plan(config: &Config) -> Result<()> {
    let broker = connect(config)?;
    let plan = plan(&broker, config)?;
    println!("Amount to invest: ${:.2}\n", plan.amount_to_invest);
    display_deltas("WITH SALES:", &plan.with_sales);
    println!();
    display_deltas("BUY ONLY:", &plan.without_sales);
    Ok(())
}

/// Run reconciliation only. Pending orders are an error (exit code 3).
pub fn run_reconcile(config: &Config) -> Result<()> {
    let broker = connect(config)?;
    let store = open_store(config)?;
    let mut audit = AuditLog::open(&config.audit_path())?;

    let engine = ReconciliationEngine::new(
        &broker,
        &store,
        &config.store.table,
        config.store.page_size,
    );
    let report = engine.reconcile()?;
    audit::log_reconcile(&mut audit, &report)?;
    print!("{report}");
    report.into_result().map(|_| ())
}

/// Show current broker positions.
pub fn show_positions(config: &Config) -> Result<()> {
    let broker = connect(config)?;
    let account = broker.account().map_err(|e| Error::broker("account", e))?;
    let positions = broker.positions().map_err(|e| Error::broker("positions", e))?;

    println!(
        "Account {}: ${:.2} equity, ${:.2} cash\n",
        account.id, account.equity, account.cash
    );
    if positions.is_empty() {
        println!("No positions.");
        return Ok(());
    }
    println!("CURRENT PORTFOLIO:");
    for p in &positions {
        println!(
            "  {:8} {:>10} = ${:>12.2}",
            p.ticker.as_str(),
            p.quantity.normalize(),
            p.market_value
        );
    }
    Ok(())
}

/// Check broker connectivity.
pub fn check_status(config: &Config) -> Result<()> {
    print!("Connecting to {}... ", config.broker.base_url);
    let broker = connect(config)?;
    let account = broker.account().map_err(|e| Error::broker("account", e))?;
    println!("OK");
    println!("Account {}: ${:.2} cash", account.id, account.cash);
    Ok(())
}

// === Helpers ===

fn display_deltas(title: &str, deltas: &Deltas) {
    println!("{title}");
    if deltas.is_empty() {
        println!("  (nothing)");
        return;
    }
    for (ticker, delta) in deltas {
        println!("  {:8} ${:>12.2}", ticker.as_str(), delta);
    }
}

fn display_outcomes(summary: &CycleSummary) {
    println!("ORDERS:");
    for (i, (ticker, amount, outcome)) in summary.outcomes.iter().enumerate() {
        match outcome {
            BuyOutcome::Submitted {
                broker_order_id,
                quantity,
                price,
                ..
            } => println!(
                "  [{}/{}] BUY {} {} @ ~${:.2} (${:.2}) order {}",
                i + 1,
                summary.outcomes.len(),
                quantity,
                ticker,
                price,
                amount,
                broker_order_id
            ),
            BuyOutcome::Skipped { price } => println!(
                "  [{}/{}] SKIP {}: ${:.2} is less than one share at ${:.2}",
                i + 1,
                summary.outcomes.len(),
                ticker,
                amount,
                price
            ),
        }
    }
}
