//! Error types for the rebalancer.

use std::path::PathBuf;

use tranche::{AllocationError, RecordError};
use tranche_broker::BrokerError;

/// Record store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {id} not found in table {table}")]
    NotFound { table: String, id: String },

    #[error("invalid table name {0:?}")]
    InvalidTable(String),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record in {path} line {line}: {message}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// The write would move a stored record backwards.
    #[error("rejected write: {0}")]
    Rejected(#[from] RecordError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// All errors that can occur during rebalancer operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid allocation: {0}")]
    Allocation(#[from] AllocationError),

    #[error("broker call {op} failed: {source}")]
    Broker {
        op: String,
        #[source]
        source: BrokerError,
    },

    #[error("store call {op} failed: {source}")]
    Store {
        op: String,
        #[source]
        source: StoreError,
    },

    /// A record points at an order the broker has never heard of.
    #[error("record {record_id} references unknown broker order {broker_order_id}")]
    Data {
        record_id: String,
        broker_order_id: String,
    },

    #[error("orders still pending at the broker: {}", pending.join(", "))]
    ReconciliationPending { pending: Vec<String> },

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl Error {
    pub fn broker(op: impl Into<String>, source: BrokerError) -> Self {
        Error::Broker {
            op: op.into(),
            source,
        }
    }

    pub fn store(op: impl Into<String>, source: StoreError) -> Self {
        Error::Store {
            op: op.into(),
            source,
        }
    }

    /// Process exit code for the CLI: 3 asks the scheduler to retry later.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ReconciliationPending { .. } => 3,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
