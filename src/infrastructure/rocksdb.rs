use super::locks::{RequestReservations, RowLocks};
use super::unit_of_work::{RowStore, StagedChanges, StagedUnitOfWork};
use crate::domain::account::{Account, AccountId, NewAccount};
use crate::domain::ledger::{EntryStatus, LedgerEntry, LedgerRecord, RequestId, StatusWrite};
use crate::domain::ports::{LedgerStore, UnitOfWork, UnitOfWorkOptions};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

/// Column Family for account rows, keyed by big-endian account id.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family mapping account number to account id (unique index).
pub const CF_ACCOUNT_NUMBERS: &str = "account_numbers";
/// Column Family for ledger entries, keyed by big-endian entry id.
pub const CF_ENTRIES: &str = "entries";
/// Column Family indexing entries by `request_id \0 entry_id`.
pub const CF_REQUEST_INDEX: &str = "request_index";

struct RocksShared {
    db: DB,
    locks: RowLocks,
    reservations: RequestReservations,
    entry_sequence: AtomicI64,
    account_sequence: AtomicI64,
    /// Serializes writers so a status patch never interleaves with a commit.
    write_lock: Mutex<()>,
}

/// A persistent Ledger Store implementation using RocksDB.
///
/// Accounts, entries and their indexes live in separate Column Families. A commit
/// is a single `WriteBatch`, which RocksDB applies atomically.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc`).
#[derive(Clone)]
pub struct RocksDBStore {
    shared: Arc<RocksShared>,
}

fn id_key(id: i64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode_id(bytes: &[u8]) -> Result<i64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LedgerError::Unavailable(format!("corrupt id key of {} bytes", bytes.len())))?;
    Ok(i64::from_be_bytes(raw))
}

fn request_prefix(request_id: &RequestId) -> Vec<u8> {
    let mut prefix = request_id.as_str().as_bytes().to_vec();
    prefix.push(0);
    prefix
}

fn request_index_key(request_id: &RequestId, entry_id: i64) -> Vec<u8> {
    let mut key = request_prefix(request_id);
    key.extend_from_slice(&id_key(entry_id));
    key
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures the required column families exist and resumes id sequences from
    /// the highest stored keys.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_ACCOUNTS, CF_ACCOUNT_NUMBERS, CF_ENTRIES, CF_REQUEST_INDEX]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let shared = RocksShared {
            db,
            locks: RowLocks::new(),
            reservations: RequestReservations::new(),
            entry_sequence: AtomicI64::new(0),
            account_sequence: AtomicI64::new(0),
            write_lock: Mutex::new(()),
        };
        let last_entry = shared.last_id(CF_ENTRIES)?;
        let last_account = shared.last_id(CF_ACCOUNTS)?;
        shared.entry_sequence.store(last_entry, Ordering::SeqCst);
        shared.account_sequence.store(last_account, Ordering::SeqCst);

        Ok(Self {
            shared: Arc::new(shared),
        })
    }
}

impl RocksShared {
    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::Unavailable(format!("{name} column family not found")))
    }

    fn last_id(&self, name: &str) -> Result<i64> {
        let cf = self.cf(name)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                decode_id(&key)
            }
            None => Ok(0),
        }
    }

    fn read_account(&self, id: AccountId) -> Result<Option<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, id_key(id.0))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_account_id(&self, account_number: &str) -> Result<Option<AccountId>> {
        let cf = self.cf(CF_ACCOUNT_NUMBERS)?;
        match self.db.get_cf(cf, account_number.as_bytes())? {
            Some(bytes) => Ok(Some(AccountId(decode_id(&bytes)?))),
            None => Ok(None),
        }
    }

    fn read_entry(&self, id: i64) -> Result<Option<LedgerEntry>> {
        let cf = self.cf(CF_ENTRIES)?;
        match self.db.get_cf(cf, id_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Entry ids carrying `request_id`, ascending.
    fn entry_ids_for(&self, request_id: &RequestId) -> Result<Vec<i64>> {
        let cf = self.cf(CF_REQUEST_INDEX)?;
        let prefix = request_prefix(request_id);
        let mut ids = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            ids.push(decode_id(&key[prefix.len()..])?);
        }
        Ok(ids)
    }

    fn all_accounts(&self) -> Result<Vec<Account>> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            accounts.push(serde_json::from_slice(&value)?);
        }
        Ok(accounts)
    }
}

#[async_trait]
impl RowStore for RocksShared {
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
        self.read_account(id)
    }

    async fn load_account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        match self.read_account_id(account_number)? {
            Some(id) => self.read_account(id),
            None => Ok(None),
        }
    }

    async fn latest_entry_for(&self, request_id: &RequestId) -> Result<Option<LedgerEntry>> {
        match self.entry_ids_for(request_id)?.last() {
            Some(id) => self.read_entry(*id),
            None => Ok(None),
        }
    }

    async fn apply(&self, changes: StagedChanges) -> Result<()> {
        let _writer = self.write_lock.lock().await;
        let accounts_cf = self.cf(CF_ACCOUNTS)?;
        let entries_cf = self.cf(CF_ENTRIES)?;
        let index_cf = self.cf(CF_REQUEST_INDEX)?;

        let mut batch = WriteBatch::default();
        for (id, balance) in changes.balances {
            let mut account = self.read_account(id)?.ok_or(LedgerError::UnknownAccount(id))?;
            account.balance = balance;
            account.updated_at = changes.committed_at;
            batch.put_cf(accounts_cf, id_key(id.0), serde_json::to_vec(&account)?);
        }
        for entry in changes.entries {
            batch.put_cf(index_cf, request_index_key(&entry.request_id, entry.id), b"");
            batch.put_cf(entries_cf, id_key(entry.id), serde_json::to_vec(&entry)?);
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
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
        let _writer = self.shared.write_lock.lock().await;
        let entries_cf = self.shared.cf(CF_ENTRIES)?;

        let mut batch = WriteBatch::default();
        let mut write = StatusWrite::default();
        for id in self.shared.entry_ids_for(request_id)? {
            let Some(mut entry) = self.shared.read_entry(id)? else {
                continue;
            };
            if !entry.status.can_become(status) {
                write.kept_completed += 1;
                continue;
            }
            entry.status = status;
            batch.put_cf(entries_cf, id_key(id), serde_json::to_vec(&entry)?);
            write.touched += 1;
        }
        if write.touched > 0 {
            self.shared.db.write(batch)?;
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

        let _writer = self.shared.write_lock.lock().await;
        if self.shared.read_account_id(&account.account_number)?.is_some() {
            return Err(LedgerError::Constraint(format!(
                "account number {} already exists",
                account.account_number
            )));
        }

        let id = AccountId(self.shared.account_sequence.fetch_add(1, Ordering::SeqCst) + 1);
        let account = account.into_account(id, Utc::now());

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.shared.cf(CF_ACCOUNTS)?,
            id_key(id.0),
            serde_json::to_vec(&account)?,
        );
        batch.put_cf(
            self.shared.cf(CF_ACCOUNT_NUMBERS)?,
            account.account_number.as_bytes(),
            id_key(id.0),
        );
        self.shared.db.write(batch)?;
        Ok(account)
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let mut accounts = self.shared.all_accounts()?;
        accounts.sort_by(|a, b| a.account_number.cmp(&b.account_number));
        Ok(accounts)
    }

    async fn ledger_history(&self, account_number: Option<&str>) -> Result<Vec<LedgerRecord>> {
        let numbers: HashMap<AccountId, String> = self
            .shared
            .all_accounts()?
            .into_iter()
            .map(|a| (a.id, a.account_number))
            .collect();
        let number_of = |id: &AccountId| -> Result<String> {
            numbers.get(id).cloned().ok_or(LedgerError::UnknownAccount(*id))
        };

        let cf = self.shared.cf(CF_ENTRIES)?;
        let mut records = Vec::new();
        for item in self.shared.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let entry: LedgerEntry = serde_json::from_slice(&value)?;
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
                request_id: entry.request_id,
                created_at: entry.created_at,
            });
        }
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }
}
