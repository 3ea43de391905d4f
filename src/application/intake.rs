use super::engine::TransferEngine;
use super::worker::{TransferJob, WorkerPool};
use crate::domain::ledger::RequestId;
use crate::domain::transfer::{TransferReceipt, TransferRequest};
use crate::error::{IntakeError, TransferError};
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A transfer as received from a caller; the request id is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntakeRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub from: String,
    pub to: String,
    pub amount: i64,
}

impl IntakeRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: i64) -> Self {
        Self {
            request_id: None,
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    fn into_transfer(self) -> TransferRequest {
        let request_id = match self.request_id {
            Some(id) if !id.is_empty() => RequestId::new(id),
            _ => RequestId::generate(),
        };
        TransferRequest {
            request_id,
            from: self.from,
            to: self.to,
            amount: self.amount,
        }
    }
}

/// Result of a synchronous transfer, tagged with the request id actually used.
#[derive(Debug)]
pub struct SyncResponse {
    pub request_id: RequestId,
    pub outcome: Result<TransferReceipt, TransferError>,
}

/// Immediate answer to an accepted asynchronous transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Queued; the final status shows up on the ledger entry for this id.
    Pending { request_id: RequestId },
}

/// Front door for transfer requests.
pub struct TransferIntake {
    engine: Arc<TransferEngine>,
    pool: Arc<WorkerPool>,
}

impl TransferIntake {
    pub fn new(engine: Arc<TransferEngine>, pool: Arc<WorkerPool>) -> Self {
        Self { engine, pool }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Runs the transfer inline under the caller's deadline.
    pub async fn transfer_sync(
        &self,
        request: IntakeRequest,
        deadline: Option<Instant>,
    ) -> SyncResponse {
        let request = request.into_transfer();
        let outcome = self.engine.transfer(&request, deadline).await;
        SyncResponse {
            request_id: request.request_id,
            outcome,
        }
    }

    /// Queues the transfer. A full queue is `IntakeError::Overloaded`, never a pending ack.
    pub fn transfer_async(&self, request: IntakeRequest) -> Result<Acknowledgement, IntakeError> {
        let request = request.into_transfer();
        // Reject early so the caller gets immediate feedback.
        request.validate()?;

        let request_id = request.request_id.clone();
        match self.pool.submit(TransferJob::new(request)) {
            Ok(()) => {
                debug!(request_id = %request_id, "transfer queued");
                Ok(Acknowledgement::Pending { request_id })
            }
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "transfer not queued");
                Err(err.into())
            }
        }
    }
}
