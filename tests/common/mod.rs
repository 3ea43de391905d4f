#![allow(dead_code)]

use async_trait::async_trait;
use payledger::application::engine::{EngineConfig, TransferEngine};
use payledger::application::reconcile::{Reconciled, StatusReconciler};
use payledger::domain::account::NewAccount;
use payledger::domain::ledger::{EntryStatus, LedgerRecord, RequestId};
use payledger::domain::ports::LedgerStore;
use payledger::domain::transfer::DuplicatePolicy;
use payledger::error::Result;
use payledger::infrastructure::in_memory::InMemoryLedgerStore;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub async fn seeded_store(accounts: &[(&str, i64)]) -> Arc<InMemoryLedgerStore> {
    let store = Arc::new(InMemoryLedgerStore::new());
    for (number, balance) in accounts {
        store
            .create_account(NewAccount::new(*number, *balance))
            .await
            .unwrap();
    }
    store
}

pub fn engine(store: &Arc<InMemoryLedgerStore>, policy: DuplicatePolicy) -> Arc<TransferEngine> {
    let config = EngineConfig {
        duplicate_policy: policy,
        ..EngineConfig::default()
    };
    Arc::new(TransferEngine::new(store.clone(), config))
}

pub async fn balance(store: &InMemoryLedgerStore, number: &str) -> i64 {
    store
        .account_by_number(number)
        .await
        .unwrap()
        .map(|account| account.balance)
        .unwrap()
}

pub async fn entries_for(store: &InMemoryLedgerStore, request_id: &str) -> Vec<LedgerRecord> {
    store
        .ledger_history(None)
        .await
        .unwrap()
        .into_iter()
        .filter(|record| record.request_id.as_str() == request_id)
        .collect()
}

/// Records every reconciliation call instead of writing it.
#[derive(Default)]
pub struct CountingReconciler {
    calls: Mutex<Vec<(RequestId, EntryStatus)>>,
}

impl CountingReconciler {
    pub fn calls(&self) -> Vec<(RequestId, EntryStatus)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, request_id: &str) -> Vec<EntryStatus> {
        self.calls()
            .into_iter()
            .filter(|(id, _)| id.as_str() == request_id)
            .map(|(_, status)| status)
            .collect()
    }

    fn record(&self, request_id: &RequestId, status: EntryStatus) -> Result<Reconciled> {
        self.calls.lock().unwrap().push((request_id.clone(), status));
        Ok(Reconciled::Updated(1))
    }
}

#[async_trait]
impl StatusReconciler for CountingReconciler {
    async fn mark_completed(&self, request_id: &RequestId) -> Result<Reconciled> {
        self.record(request_id, EntryStatus::Completed)
    }

    async fn mark_failed(&self, request_id: &RequestId) -> Result<Reconciled> {
        self.record(request_id, EntryStatus::Failed)
    }
}

pub fn write_transfers_csv(path: &Path, rows: &[(&str, &str, &str, i64)]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["request_id", "from", "to", "amount"])?;
    for (request_id, from, to, amount) in rows {
        wtr.write_record([*request_id, *from, *to, &amount.to_string()])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_accounts_csv(path: &Path, accounts: &[(&str, i64)]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["account_number", "name", "email", "phone", "balance"])?;
    for (number, balance) in accounts {
        wtr.write_record([*number, *number, "", "", &balance.to_string()])?;
    }

    wtr.flush()?;
    Ok(())
}
