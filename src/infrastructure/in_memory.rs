use super::locks::{RequestReservations, RowLocks};
use super::unit_of_work::{RowStore, StagedChanges, StagedUnitOfWork};
use crate::domain::account::{Account, AccountId, NewAccount};
use crate::domain::ledger::{EntryStatus, LedgerEntry, LedgerRecord, RequestId, StatusWrite};
use crate::domain::ports::{LedgerStore, UnitOfWork, UnitOfWorkOptions};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerTables {
    accounts: HashMap<AccountId, Account>,
    account_numbers: HashMap<String, AccountId>,
    /// Kept in id order.
    entries: Vec<LedgerEntry>,
    next_account_id: i64,
}

#[derive(Default)]
struct Shared {
    tables: RwLock<LedgerTables>,
    locks: RowLocks,
    reservations: RequestReservations,
    entry_sequence: AtomicI64,
}

/// A thread-safe in-memory Ledger Store.
///
/// Committed state sits behind a single `RwLock`; units of work stage their writes
/// and publish them under one write lock, so readers never see half a transfer.
/// Ideal for tests and for runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RowStore for Shared {
    fn row_locks(&self) -> &RowLocks {
        &self.locks
    }

    fn reservations(&self) -> &RequestReservations {
        &self.reservations
    }

    fn next_entry_id(&self) -> i64 {
        self.entry_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn load_account(&self, id: AccountId) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(&id).cloned())
    }

    async fn load_account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .account_numbers
            .get(account_number)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    async fn latest_entry_for(&self, request_id: &RequestId) -> Result<Option<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .entries
            .iter()
            .rev()
            .find(|e| &e.request_id == request_id)
            .cloned())
    }

    async fn apply(&self, changes: StagedChanges) -> Result<()> {
        let mut tables = self.tables.write().await;

        // Check everything before touching anything.
        for (id, _) in &changes.balances {
            if !tables.accounts.contains_key(id) {
                return Err(LedgerError::UnknownAccount(*id));
            }
        }

        for (id, balance) in changes.balances {
            if let Some(account) = tables.accounts.get_mut(&id) {
                account.balance = balance;
                account.updated_at = changes.committed_at;
            }
        }
        tables.entries.extend(changes.entries);
        tables.entries.sort_by_key(|e| e.id);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self, options: UnitOfWorkOptions) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(StagedUnitOfWork::new(
            Arc::clone(&self.shared),
            options,
        )))
    }

    async fn account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        self.shared.load_account_by_number(account_number).await
    }

    async fn update_entry_status(
        &self,
        request_id: &RequestId,
        status: EntryStatus,
    ) -> Result<StatusWrite> {
        let mut tables = self.shared.tables.write().await;
        let mut write = StatusWrite::default();
        for entry in tables
            .entries
            .iter_mut()
            .filter(|e| &e.request_id == request_id)
        {
            if entry.status.can_become(status) {
                entry.status = status;
                write.touched += 1;
            } else {
                write.kept_completed += 1;
            }
        }
        Ok(write)
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        if account.account_number.is_empty() {
            return Err(LedgerError::Constraint(
                "account number must not be empty".to_string(),
            ));
        }
        if account.balance < 0 {
            return Err(LedgerError::Constraint(format!(
                "initial balance must not be negative, got {}",
                account.balance
            )));
        }

        let mut tables = self.shared.tables.write().await;
        if tables.account_numbers.contains_key(&account.account_number) {
            return Err(LedgerError::Constraint(format!(
                "account number {} already exists",
                account.account_number
            )));
        }
        tables.next_account_id += 1;
        let id = AccountId(tables.next_account_id);
        let account = account.into_account(id, Utc::now());
        tables
            .account_numbers
            .insert(account.account_number.clone(), id);
        tables.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let tables = self.shared.tables.read().await;
        let mut accounts: Vec<Account> = tables.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.account_number.cmp(&b.account_number));
        Ok(accounts)
    }

    async fn ledger_history(&self, account_number: Option<&str>) -> Result<Vec<LedgerRecord>> {
        let tables = self.shared.tables.read().await;
        let number_of = |id: &AccountId| -> Result<String> {
            tables
                .accounts
                .get(id)
                .map(|a| a.account_number.clone())
                .ok_or(LedgerError::UnknownAccount(*id))
        };

        let mut records = Vec::new();
        for entry in &tables.entries {
            let from = number_of(&entry.from_account)?;
            let to = number_of(&entry.to_account)?;
            if let Some(wanted) = account_number
                && from != wanted
                && to != wanted
            {
                continue;
            }
            records.push(LedgerRecord {
                id: entry.id,
                from_account: from,
                to_account: to,
                amount: entry.amount,
                status: entry.status,
                request_id: entry.request_id.clone(),
                created_at: entry.created_at,
            });
        }
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }
}
