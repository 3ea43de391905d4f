use super::account::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied or gateway-generated identifier of one transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh id for callers that did not supply one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Terminal outcome recorded on a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }

    /// Whether a status write may move an entry from `self` to `next`.
    pub fn can_become(self, next: EntryStatus) -> bool {
        !(self == EntryStatus::Completed && next == EntryStatus::Failed)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one transfer attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub from_account: AccountId,
    pub to_account: AccountId,
    /// Always positive.
    pub amount: i64,
    pub status: EntryStatus,
    pub request_id: RequestId,
    pub created_at: DateTime<Utc>,
}

/// Entry as staged inside a unit of work, before the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: i64,
    pub status: EntryStatus,
    pub request_id: RequestId,
}

impl NewLedgerEntry {
    pub(crate) fn into_entry(self, id: i64, created_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            from_account: self.from_account,
            to_account: self.to_account,
            amount: self.amount,
            status: self.status,
            request_id: self.request_id,
            created_at,
        }
    }
}

/// Read-only view of a ledger entry with account numbers resolved, for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRecord {
    pub id: i64,
    pub from_account: String,
    pub to_account: String,
    pub amount: i64,
    pub status: EntryStatus,
    pub request_id: RequestId,
    pub created_at: DateTime<Utc>,
}

/// What a status write did to the entries carrying one request id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusWrite {
    /// Entries now holding the requested status.
    pub touched: u64,
    /// Completed entries a `Failed` write left alone: their balances already moved.
    pub kept_completed: u64,
}

/// Result of reserving a request id inside a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// Never seen before; now held by this unit of work until it ends.
    Fresh,
    /// Another live unit of work still held the reservation when the wait ran out.
    InFlight,
    /// A committed entry already carries this request id.
    Existing(LedgerEntry),
}
