//! TOML configuration loading and validation.
//!
//! Environment overrides (`TRANCHE_WEIGHTS`, `TRANCHE_MAX_INVESTMENT`,
//! `TRANCHE_DRY_RUN`) are applied on top of the file before validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tranche::{AllocationPlanner, Decimal, Ticker, Weights};
use tranche_broker::alpaca::AlpacaConfig;
use tranche_broker::alpaca::client::{DATA_URL, PAPER_URL};

use crate::error::{Error, Result};

pub const ENV_WEIGHTS: &str = "TRANCHE_WEIGHTS";
pub const ENV_MAX_INVESTMENT: &str = "TRANCHE_MAX_INVESTMENT";
pub const ENV_DRY_RUN: &str = "TRANCHE_DRY_RUN";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Alpaca,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_kind")]
    pub kind: BrokerKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_data_url")]
    pub data_url: String,
    #[serde(default = "default_key_env")]
    pub key_env: String,
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_kind() -> BrokerKind {
    BrokerKind::Alpaca
}
fn default_base_url() -> String {
    PAPER_URL.into()
}
fn default_data_url() -> String {
    DATA_URL.into()
}
fn default_key_env() -> String {
    "APCA_API_KEY_ID".into()
}
fn default_secret_env() -> String {
    "APCA_API_SECRET_KEY".into()
}
fn default_timeout() -> u64 {
    30
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            base_url: default_base_url(),
            data_url: default_data_url(),
            key_env: default_key_env(),
            secret_env: default_secret_env(),
            timeout_secs: default_timeout(),
        }
    }
}

impl BrokerConfig {
    pub fn alpaca(&self) -> AlpacaConfig {
        AlpacaConfig {
            base_url: self.base_url.clone(),
            data_url: self.data_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Target weights and the per-run investment ceiling.
///
/// Both are kept as text until validation so a bad value is reported as a
/// config error naming the field.
#[derive(Debug, Clone, Deserialize)]
pub struct AllocationConfig {
    pub max_investment: String,
    #[serde(default)]
    pub weights: BTreeMap<String, WeightValue>,
}

/// A weight written either as a TOML number or as a decimal string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WeightValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl WeightValue {
    fn to_decimal(&self) -> Option<Decimal> {
        match self {
            WeightValue::Int(i) => Some(Decimal::from(*i)),
            WeightValue::Float(f) => Decimal::from_str(&f.to_string()).ok(),
            WeightValue::Text(s) => Decimal::from_str(s.trim()).ok(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_store_dir() -> String {
    "./data".into()
}
fn default_table() -> String {
    "trade_records".into()
}
fn default_page_size() -> usize {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            table: default_table(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, apply environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config = Self::parse(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from `lookup` (the process environment in `load`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(json) = lookup(ENV_WEIGHTS) {
            let parsed: BTreeMap<String, serde_json::Number> = serde_json::from_str(&json)
                .map_err(|e| Error::Config(format!("{ENV_WEIGHTS}: {e}")))?;
            self.allocation.weights = parsed
                .into_iter()
                .map(|(k, v)| (k, WeightValue::Text(v.to_string())))
                .collect();
        }
        if let Some(max) = lookup(ENV_MAX_INVESTMENT) {
            self.allocation.max_investment = max;
        }
        if lookup(ENV_DRY_RUN).is_some_and(|v| !v.is_empty()) {
            self.run.dry_run = true;
        }
        Ok(())
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        self.max_investment()?;
        self.planner()?;
        if self.store.table.is_empty() {
            return Err(Error::Config("store table must not be empty".into()));
        }
        if self.store.page_size == 0 {
            return Err(Error::Config("store page_size must be > 0".into()));
        }
        if self.broker.timeout_secs == 0 {
            return Err(Error::Config("broker timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn max_investment(&self) -> Result<Decimal> {
        let raw = self.allocation.max_investment.trim();
        let value = Decimal::from_str(raw)
            .map_err(|e| Error::Config(format!("max_investment {raw:?}: {e}")))?;
        if value.is_sign_negative() {
            return Err(Error::Config(format!("max_investment must be >= 0, got {value}")));
        }
        Ok(value)
    }

    pub fn weights(&self) -> Result<Weights> {
        let mut weights = Weights::new();
        for (name, raw) in &self.allocation.weights {
            let ticker = Ticker::new(name)
                .map_err(|e| Error::Config(format!("weights: {e}")))?;
            let weight = raw.to_decimal().ok_or_else(|| {
                Error::Config(format!("weight for {ticker} is not a number: {raw:?}"))
            })?;
            if weights.insert(ticker.clone(), weight).is_some() {
                return Err(Error::Config(format!("duplicate weight for {ticker}")));
            }
        }
        Ok(weights)
    }

    pub fn planner(&self) -> Result<AllocationPlanner> {
        Ok(AllocationPlanner::new(self.weights()?)?)
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }

    pub fn store_dir(&self) -> PathBuf {
        PathBuf::from(&self.store.dir)
    }
}
