use crate::domain::account::AccountId;
use crate::domain::ledger::RequestId;
use crate::error::{LedgerError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as RowMutex, Notify, OwnedMutexGuard};

/// Exclusive per-account row locks.
///
/// A lock is held for as long as its guard lives, which for a unit of work means
/// until commit, rollback or drop.
#[derive(Default)]
pub struct RowLocks {
    rows: Mutex<HashMap<AccountId, Arc<RowMutex<()>>>>,
}

pub type RowGuard = OwnedMutexGuard<()>;

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits at most `timeout` for the row lock on `id`.
    pub async fn acquire(&self, id: AccountId, timeout: Duration) -> Result<RowGuard> {
        let row = {
            let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(rows.entry(id).or_default())
        };
        tokio::time::timeout(timeout, row.lock_owned())
            .await
            .map_err(|_| LedgerError::LockTimeout(id))
    }
}

/// Request ids currently reserved by live units of work.
#[derive(Default)]
pub struct RequestReservations {
    in_flight: Mutex<HashSet<RequestId>>,
    released: Notify,
}

impl RequestReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when another unit of work already holds `request_id`.
    pub fn try_reserve(&self, request_id: &RequestId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id.clone())
    }

    /// Reserves `request_id`, waiting at most `timeout` for a current holder to
    /// commit or roll back. Returns false if the holder outlives the wait.
    pub async fn reserve(&self, request_id: &RequestId, timeout: Duration) -> bool {
        let wait = async {
            loop {
                // Registered before the check so a release in between is not missed.
                let released = self.released.notified();
                if self.try_reserve(request_id) {
                    return;
                }
                released.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    pub fn release(&self, request_id: &RequestId) {
        let removed = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request_id);
        if removed {
            self.released.notify_waiters();
        }
    }

    pub fn is_reserved(&self, request_id: &RequestId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(request_id)
    }
}
