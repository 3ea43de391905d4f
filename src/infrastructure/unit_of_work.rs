//! Unit of work shared by every store backend.
//!
//! Reads go to the backend, writes are staged locally and handed to the backend
//! in one `apply` call on commit. Row locks and request reservations live in
//! process memory next to the backend, so both backends serialize the same way.

use super::locks::{RequestReservations, RowGuard, RowLocks};
use crate::domain::account::{Account, AccountId};
use crate::domain::ledger::{LedgerEntry, NewLedgerEntry, RequestId, Reservation};
use crate::domain::ports::{UnitOfWork, UnitOfWorkOptions};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Everything a committed unit of work publishes.
#[derive(Debug, Default)]
pub struct StagedChanges {
    pub balances: Vec<(AccountId, i64)>,
    pub entries: Vec<LedgerEntry>,
    pub committed_at: DateTime<Utc>,
}

impl StagedChanges {
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty() && self.entries.is_empty()
    }
}

/// Committed-state access a backend provides to [`StagedUnitOfWork`].
#[async_trait]
pub trait RowStore: Send + Sync + 'static {
    fn row_locks(&self) -> &RowLocks;

    fn reservations(&self) -> &RequestReservations;

    /// Allocates an entry id. Ids of rolled-back entries are not reused.
    fn next_entry_id(&self) -> i64;

    async fn load_account(&self, id: AccountId) -> Result<Option<Account>>;

    async fn load_account_by_number(&self, account_number: &str) -> Result<Option<Account>>;

    /// Most recent committed entry carrying `request_id`.
    async fn latest_entry_for(&self, request_id: &RequestId) -> Result<Option<LedgerEntry>>;

    /// Publishes all changes atomically, or none of them.
    async fn apply(&self, changes: StagedChanges) -> Result<()>;
}

pub struct StagedUnitOfWork<S: RowStore> {
    rows: Arc<S>,
    options: UnitOfWorkOptions,
    held: HashMap<AccountId, RowGuard>,
    balances: BTreeMap<AccountId, i64>,
    entries: Vec<(i64, NewLedgerEntry)>,
    reserved: Vec<RequestId>,
}

impl<S: RowStore> StagedUnitOfWork<S> {
    pub fn new(rows: Arc<S>, options: UnitOfWorkOptions) -> Self {
        Self {
            rows,
            options,
            held: HashMap::new(),
            balances: BTreeMap::new(),
            entries: Vec::new(),
            reserved: Vec::new(),
        }
    }

    fn overlay(&self, mut account: Account) -> Account {
        if let Some(balance) = self.balances.get(&account.id) {
            account.balance = *balance;
        }
        account
    }

    async fn require_account(&self, id: AccountId) -> Result<()> {
        if self.held.contains_key(&id) || self.rows.load_account(id).await?.is_some() {
            Ok(())
        } else {
            Err(LedgerError::Constraint(format!(
                "ledger entry references missing account {id}"
            )))
        }
    }

    fn release_reservations(&mut self) {
        for request_id in self.reserved.drain(..) {
            self.rows.reservations().release(&request_id);
        }
    }
}

#[async_trait]
impl<S: RowStore> UnitOfWork for StagedUnitOfWork<S> {
    async fn account_by_number(&mut self, account_number: &str) -> Result<Option<Account>> {
        let account = self.rows.load_account_by_number(account_number).await?;
        Ok(account.map(|a| self.overlay(a)))
    }

    async fn lock_account(&mut self, id: AccountId) -> Result<Account> {
        if !self.held.contains_key(&id) {
            let guard = self
                .rows
                .row_locks()
                .acquire(id, self.options.lock_timeout)
                .await?;
            self.held.insert(id, guard);
        }
        // Re-read after the lock is ours: the committed row may have moved on.
        match self.rows.load_account(id).await? {
            Some(account) => Ok(self.overlay(account)),
            None => {
                self.held.remove(&id);
                Err(LedgerError::UnknownAccount(id))
            }
        }
    }

    async fn update_balance(&mut self, id: AccountId, balance: i64) -> Result<()> {
        if !self.held.contains_key(&id) {
            return Err(LedgerError::Constraint(format!(
                "balance update on account {id} without its row lock"
            )));
        }
        if balance < 0 {
            return Err(LedgerError::Constraint(format!(
                "balance of account {id} would become negative ({balance})"
            )));
        }
        self.balances.insert(id, balance);
        Ok(())
    }

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<i64> {
        if entry.amount <= 0 {
            return Err(LedgerError::Constraint(format!(
                "ledger entry amount must be positive, got {}",
                entry.amount
            )));
        }
        self.require_account(entry.from_account).await?;
        self.require_account(entry.to_account).await?;

        let id = self.rows.next_entry_id();
        self.entries.push((id, entry));
        Ok(id)
    }

    async fn reserve_request(&mut self, request_id: &RequestId) -> Result<Reservation> {
        if self.reserved.contains(request_id) {
            return Ok(Reservation::Fresh);
        }
        // Reserve before looking for a committed entry: a committer publishes its
        // entry before releasing, so this order cannot miss one. A live holder is
        // waited out like a unique-key insert, bounded by the lock timeout.
        if !self
            .rows
            .reservations()
            .reserve(request_id, self.options.lock_timeout)
            .await
        {
            return Ok(Reservation::InFlight);
        }
        match self.rows.latest_entry_for(request_id).await {
            Ok(Some(entry)) => {
                self.rows.reservations().release(request_id);
                Ok(Reservation::Existing(entry))
            }
            Ok(None) => {
                self.reserved.push(request_id.clone());
                Ok(Reservation::Fresh)
            }
            Err(err) => {
                self.rows.reservations().release(request_id);
                Err(err)
            }
        }
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let committed_at = Utc::now();
        let changes = StagedChanges {
            balances: std::mem::take(&mut self.balances).into_iter().collect(),
            entries: std::mem::take(&mut self.entries)
                .into_iter()
                .map(|(id, entry)| entry.into_entry(id, committed_at))
                .collect(),
            committed_at,
        };
        if !changes.is_empty() {
            self.rows.apply(changes).await?;
        }
        self.release_reservations();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Dropping discards staged writes and releases locks and reservations.
        Ok(())
    }
}

impl<S: RowStore> Drop for StagedUnitOfWork<S> {
    fn drop(&mut self) {
        self.release_reservations();
    }
}
