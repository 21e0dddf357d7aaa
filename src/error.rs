use std::convert::Infallible;
use std::fmt;

/// The record families kept in world state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Medicine,
    Order,
    Evidence,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Medicine => "medicine",
            RecordKind::Order => "order",
            RecordKind::Evidence => "evidence",
        };
        f.write_str(name)
    }
}

/// Every way a custody operation can be refused. Variants carry the offending
/// key or field so callers can decide whether to resubmit with corrected input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("{kind} '{key}' was not found")]
    NotFound { kind: RecordKind, key: String },
    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: RecordKind, key: String },
    #[error("caller '{caller}' is not authorised, '{required}' is required")]
    Unauthorized { caller: String, required: String },
    #[error("'{key}' cannot move from {from} to {to}")]
    InvalidTransition {
        key: String,
        from: String,
        to: String,
    },
    #[error("'{key}' holds {available} units but {requested} were requested")]
    InsufficientQuantity {
        key: String,
        requested: u64,
        available: u64,
    },
    #[error("credential does not verify against the custody hash of '{key}'")]
    Integrity { key: String },
    #[error("field '{0}' cannot be updated")]
    InvalidField(String),
    #[error("record encoding failed: {0}")]
    Serialization(String),
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),
    #[error("state access failed: {0}")]
    State(String),
}

impl CustodyError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: RecordKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }
}

impl From<minicbor::decode::Error> for CustodyError {
    fn from(err: minicbor::decode::Error) -> Self {
        CustodyError::Serialization(err.to_string())
    }
}

impl From<minicbor::encode::Error<Infallible>> for CustodyError {
    fn from(err: minicbor::encode::Error<Infallible>) -> Self {
        CustodyError::Serialization(err.to_string())
    }
}

/// Failures raised by a ledger host around an invocation.
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("invocation rejected: {0}")]
    Rejected(#[from] CustodyError),
    #[error("read set is stale at key '{key}', resubmit the invocation")]
    Conflict { key: String },
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
}
