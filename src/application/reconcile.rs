use crate::domain::ledger::{EntryStatus, RequestId, StatusWrite};
use crate::domain::ports::LedgerStoreHandle;
use crate::error::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

/// What a status reconciliation write found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Updated(u64),
    /// Only completed entries matched a failed mark; they keep their status.
    KeptCompleted(u64),
    /// No entry carries the request id; nothing was written.
    Missing,
}

/// Out-of-band status writes issued by workers after each job.
///
/// Both calls are idempotent and keyed by request id.
#[async_trait]
pub trait StatusReconciler: Send + Sync {
    async fn mark_completed(&self, request_id: &RequestId) -> Result<Reconciled>;
    async fn mark_failed(&self, request_id: &RequestId) -> Result<Reconciled>;
}

/// Reconciles through the Ledger Store's status update.
pub struct LedgerReconciler {
    store: LedgerStoreHandle,
}

impl LedgerReconciler {
    pub fn new(store: LedgerStoreHandle) -> Self {
        Self { store }
    }

    async fn mark(&self, request_id: &RequestId, status: EntryStatus) -> Result<Reconciled> {
        let write = self.store.update_entry_status(request_id, status).await?;
        if write.kept_completed > 0 {
            warn!(
                request_id = %request_id,
                %status,
                kept = write.kept_completed,
                "completed ledger entry not downgraded"
            );
        }
        match write {
            StatusWrite { touched: 0, kept_completed: 0 } => {
                warn!(request_id = %request_id, %status, "no ledger entry to reconcile");
                Ok(Reconciled::Missing)
            }
            StatusWrite { touched: 0, kept_completed } => Ok(Reconciled::KeptCompleted(kept_completed)),
            StatusWrite { touched, .. } => {
                debug!(request_id = %request_id, %status, touched, "ledger entry reconciled");
                Ok(Reconciled::Updated(touched))
            }
        }
    }
}

#[async_trait]
impl StatusReconciler for LedgerReconciler {
    async fn mark_completed(&self, request_id: &RequestId) -> Result<Reconciled> {
        self.mark(request_id, EntryStatus::Completed).await
    }

    async fn mark_failed(&self, request_id: &RequestId) -> Result<Reconciled> {
        self.mark(request_id, EntryStatus::Failed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::NewAccount;
    use crate::domain::ledger::NewLedgerEntry;
    use crate::domain::ports::{LedgerStore, UnitOfWork, UnitOfWorkOptions};
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_entry_is_a_no_op() {
        let reconciler = LedgerReconciler::new(Arc::new(InMemoryLedgerStore::new()));
        let result = reconciler.mark_failed(&RequestId::new("ghost")).await.unwrap();
        assert_eq!(result, Reconciled::Missing);
    }

    #[tokio::test]
    async fn test_marks_are_idempotent() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let a = store.create_account(NewAccount::new("A", 10)).await.unwrap();
        let mut uow = store.begin(UnitOfWorkOptions::default()).await.unwrap();
        uow.insert_entry(NewLedgerEntry {
            from_account: a.id,
            to_account: a.id,
            amount: 10,
            status: EntryStatus::Failed,
            request_id: RequestId::new("r1"),
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();

        let reconciler = LedgerReconciler::new(store.clone());
        let r1 = RequestId::new("r1");
        assert_eq!(reconciler.mark_completed(&r1).await.unwrap(), Reconciled::Updated(1));
        assert_eq!(reconciler.mark_completed(&r1).await.unwrap(), Reconciled::Updated(1));

        let history = store.ledger_history(None).await.unwrap();
        assert_eq!(history[0].status, EntryStatus::Completed);

        assert_eq!(reconciler.mark_failed(&r1).await.unwrap(), Reconciled::KeptCompleted(1));
        let history = store.ledger_history(None).await.unwrap();
        assert_eq!(history[0].status, EntryStatus::Completed);
    }
}
