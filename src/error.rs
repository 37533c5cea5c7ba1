//! Error types for the allocation planner and the trade-record lifecycle.

use crate::record::RecordStatus;

/// Invalid ticker text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TickerError {
    #[error("ticker must not be empty")]
    Empty,

    #[error("ticker '{0}' is too long")]
    TooLong(String),

    #[error("ticker '{0}' contains invalid character {1:?}")]
    InvalidChar(String, char),
}

/// Errors returned by the delta computations.
///
/// Every variant except `Overflow` means the target allocation itself is
/// unusable and the cycle must stop before touching the broker.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("cannot compute deltas with no target weights defined")]
    EmptyWeights,

    #[error("target weights sum to zero")]
    ZeroTotalWeight,

    #[error("weight for {ticker} is negative ({weight})")]
    NegativeWeight {
        ticker: String,
        weight: rust_decimal::Decimal,
    },

    #[error("decimal overflow while computing {0}")]
    Overflow(&'static str),
}

/// Rejected trade-record transitions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record {id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: RecordStatus,
        to: RecordStatus,
    },

    #[error("record {0} is already reconciled")]
    AlreadyReconciled(String),

    #[error("record {0}: broker order id must not be empty")]
    EmptyBrokerOrderId(String),

    #[error("record {id} already references broker order {existing}, refusing {new}")]
    BrokerOrderIdConflict {
        id: String,
        existing: String,
        new: String,
    },
}
