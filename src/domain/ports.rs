use super::account::{Account, AccountId, NewAccount};
use super::ledger::{
    EntryStatus, LedgerRecord, NewLedgerEntry, RequestId, Reservation, StatusWrite,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitOfWorkOptions {
    /// Upper bound on the wait for any single row lock.
    pub lock_timeout: Duration,
}

impl Default for UnitOfWorkOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Durable account and ledger storage.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens an atomic unit of work.
    async fn begin(&self, options: UnitOfWorkOptions) -> Result<Box<dyn UnitOfWork>>;

    /// Reads an account by business key outside any unit of work.
    async fn account_by_number(&self, account_number: &str) -> Result<Option<Account>>;

    /// Sets the status of every entry carrying `request_id`.
    ///
    /// A completed entry is never downgraded to failed; such entries are counted
    /// in `StatusWrite::kept_completed` instead.
    async fn update_entry_status(
        &self,
        request_id: &RequestId,
        status: EntryStatus,
    ) -> Result<StatusWrite>;

    async fn create_account(&self, account: NewAccount) -> Result<Account>;

    async fn all_accounts(&self) -> Result<Vec<Account>>;

    /// Ledger history, oldest first; restricted to one account when a number is given.
    async fn ledger_history(&self, account_number: Option<&str>) -> Result<Vec<LedgerRecord>>;
}

/// One atomic, all-or-nothing sequence of reads and writes.
///
/// Writes are staged and published together by `commit`. Dropping a unit of work
/// without committing discards them and releases every lock and reservation it holds.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn account_by_number(&mut self, account_number: &str) -> Result<Option<Account>>;

    /// Takes the exclusive row lock on `id` and returns the row as seen under that lock.
    async fn lock_account(&mut self, id: AccountId) -> Result<Account>;

    /// Requires the row lock on `id`.
    async fn update_balance(&mut self, id: AccountId, balance: i64) -> Result<()>;

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<i64>;

    async fn reserve_request(&mut self, request_id: &RequestId) -> Result<Reservation>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

pub type LedgerStoreHandle = Arc<dyn LedgerStore>;
