use crate::domain::account::AccountId;
use crate::domain::ledger::{EntryStatus, RequestId};
use thiserror::Error;

/// Infrastructure failures raised by a Ledger Store.
///
/// None of these leave a ledger entry behind: the unit of work that hit them is
/// rolled back, so the same transfer can be retried from scratch.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("timed out waiting for row lock on account {0}")]
    LockTimeout(AccountId),
    #[error("account {0} is not present in this unit of work")]
    UnknownAccount(AccountId),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    Storage(#[from] rocksdb::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount must be a positive integer (minor units), got {0}")]
    NonPositiveAmount(i64),
    #[error("cannot transfer to the same account")]
    SameAccount,
    #[error("account number must not be empty")]
    EmptyAccountNumber,
}

/// Which part of the taxonomy an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before any persistence.
    Validation,
    /// Recorded as a failed ledger entry; an expected outcome.
    Business,
    /// Rolled back; opaque and safe to retry.
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("from account not found: {0}")]
    SourceNotFound(String),
    #[error("to account not found: {0}")]
    DestinationNotFound(String),
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },
    #[error("request {request_id} is a duplicate")]
    DuplicateRequest {
        request_id: RequestId,
        /// Status committed for the earlier use, if it finished; `None` while it is in flight.
        recorded: Option<EntryStatus>,
    },
    #[error("request {0} was already processed and failed")]
    PreviouslyFailed(RequestId),
    #[error("deadline exceeded before commit")]
    DeadlineExceeded,
    #[error("infrastructure error: {0}")]
    Infra(#[from] LedgerError),
}

impl TransferError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TransferError::Validation(_)
            | TransferError::DuplicateRequest { .. }
            | TransferError::PreviouslyFailed(_) => ErrorClass::Validation,
            TransferError::SourceNotFound(_)
            | TransferError::DestinationNotFound(_)
            | TransferError::InsufficientFunds { .. } => ErrorClass::Business,
            TransferError::DeadlineExceeded | TransferError::Infra(_) => {
                ErrorClass::Infrastructure
            }
        }
    }

    /// Status already committed under this request id by an earlier attempt.
    pub fn recorded_status(&self) -> Option<EntryStatus> {
        match self {
            TransferError::DuplicateRequest { recorded, .. } => *recorded,
            TransferError::PreviouslyFailed(_) => Some(EntryStatus::Failed),
            _ => None,
        }
    }

    /// Whether replaying the same request from scratch may succeed.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Infrastructure
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("transfer queue is full (capacity {capacity}), please retry later")]
    QueueFull { capacity: usize },
    #[error("worker pool is no longer accepting jobs")]
    Closed,
}

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("service overloaded: {0}")]
    Overloaded(DispatchError),
    #[error("service shutting down")]
    ShuttingDown,
}

impl From<DispatchError> for IntakeError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::QueueFull { .. } => IntakeError::Overloaded(err),
            DispatchError::Closed => IntakeError::ShuttingDown,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("queue capacity must be at least 1")]
    NoQueueCapacity,
    #[error("lock timeout must be greater than zero")]
    ZeroLockTimeout,
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
