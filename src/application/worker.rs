use super::engine::TransferEngine;
use super::reconcile::StatusReconciler;
use crate::domain::ledger::EntryStatus;
use crate::domain::transfer::TransferRequest;
use crate::error::{DispatchError, LedgerError, TransferError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Deadline given to each job when it is enqueued.
    pub job_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 100,
            job_timeout: None,
        }
    }
}

/// A queued transfer.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub request: TransferRequest,
    pub deadline: Option<Instant>,
}

impl TransferJob {
    pub fn new(request: TransferRequest) -> Self {
        Self {
            request,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLoad {
    pub queued: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub processed: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            processed: self.processed.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Bounded queue of transfer jobs drained by a fixed set of workers.
///
/// Lifecycle: `start`, then any number of `submit` calls, then `shutdown`, which
/// stops accepting, lets the workers finish everything already queued and joins them.
pub struct WorkerPool {
    sender: std::sync::Mutex<Option<mpsc::Sender<TransferJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    config: DispatchConfig,
}

impl WorkerPool {
    /// Spawns `config.workers` workers on the current tokio runtime.
    pub fn start(
        engine: Arc<TransferEngine>,
        reconciler: Arc<dyn StatusReconciler>,
        config: DispatchConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let workers = (0..config.workers)
            .map(|worker_id| {
                let worker = Worker {
                    worker_id,
                    receiver: Arc::clone(&receiver),
                    engine: Arc::clone(&engine),
                    reconciler: Arc::clone(&reconciler),
                    counters: Arc::clone(&counters),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Self {
            sender: std::sync::Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            counters,
            config,
        }
    }

    /// Enqueues a job without waiting. A full queue is reported immediately.
    pub fn submit(&self, mut job: TransferJob) -> Result<(), DispatchError> {
        if job.deadline.is_none()
            && let Some(timeout) = self.config.job_timeout
        {
            job.deadline = Some(Instant::now() + timeout);
        }

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(DispatchError::Closed);
        };
        sender.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => DispatchError::QueueFull {
                capacity: sender.max_capacity(),
            },
            TrySendError::Closed(_) => DispatchError::Closed,
        })
    }

    /// Jobs waiting in the queue (not counting those being processed) and the capacity.
    pub fn queue_load(&self) -> QueueLoad {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => QueueLoad {
                queued: sender.max_capacity() - sender.capacity(),
                capacity: sender.max_capacity(),
            },
            None => QueueLoad {
                queued: 0,
                capacity: self.config.queue_capacity,
            },
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Stops accepting jobs, drains the queue and waits for every worker to exit.
    pub async fn shutdown(&self) -> PoolStats {
        // Dropping the only sender closes the channel once it is empty.
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in workers {
            if let Err(err) = handle.await {
                error!(error = %err, "worker terminated abnormally");
            }
        }

        let stats = self.stats();
        info!(
            processed = stats.processed,
            completed = stats.completed,
            failed = stats.failed,
            "worker pool stopped"
        );
        stats
    }
}

struct Worker {
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<TransferJob>>>,
    engine: Arc<TransferEngine>,
    reconciler: Arc<dyn StatusReconciler>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self) {
        info!(worker_id = self.worker_id, "worker started");
        loop {
            // Only the receiving worker holds the lock while waiting.
            let job = self.receiver.lock().await.recv().await;
            let Some(job) = job else { break };
            self.process(job).await;
        }
        info!(worker_id = self.worker_id, "worker stopped");
    }

    #[instrument(name = "job", skip_all, fields(worker_id = self.worker_id, request_id = %job.request.request_id))]
    async fn process(&self, job: TransferJob) {
        let request_id = job.request.request_id.clone();

        // A panicking transfer is isolated to its own task and counts as failed.
        let engine = Arc::clone(&self.engine);
        let transfer = async move { engine.transfer(&job.request, job.deadline).await };
        let outcome = tokio::spawn(transfer.in_current_span())
            .await
            .unwrap_or_else(|join_err| {
                error!(error = %join_err, "transfer task aborted");
                Err(TransferError::Infra(LedgerError::Unavailable(
                    join_err.to_string(),
                )))
            });

        let reconciled = match &outcome {
            Ok(_) => {
                self.counters.completed.fetch_add(1, Ordering::SeqCst);
                info!("transfer completed");
                self.reconciler.mark_completed(&request_id).await
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                error!(error = %err, "transfer failed");
                // A duplicate reports the status already on record for its request id.
                match err.recorded_status() {
                    Some(EntryStatus::Completed) => self.reconciler.mark_completed(&request_id).await,
                    _ => self.reconciler.mark_failed(&request_id).await,
                }
            }
        };
        if let Err(err) = reconciled {
            error!(error = %err, "status reconciliation failed");
        }
        self.counters.processed.fetch_add(1, Ordering::SeqCst);
    }
}
