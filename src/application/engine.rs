use crate::domain::ledger::{EntryStatus, LedgerEntry, NewLedgerEntry, Reservation};
use crate::domain::ports::{LedgerStoreHandle, UnitOfWork, UnitOfWorkOptions};
use crate::domain::transfer::{Amount, DuplicatePolicy, TransferReceipt, TransferRequest};
use crate::error::{LedgerError, TransferError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Longest wait for any single row lock.
    pub lock_timeout: Duration,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

type Outcome = Result<TransferReceipt, TransferError>;

/// How a unit of work ends once the protocol has decided the outcome.
enum Decision {
    /// Publish staged writes, then report the outcome.
    Commit(Outcome),
    /// Discard staged writes, then report the outcome.
    Abort(Outcome),
}

/// Moves money between two accounts as one atomic unit of work.
///
/// Business failures (unknown destination, insufficient funds) are committed as a
/// failed ledger entry. An unknown source and every infrastructure failure roll
/// back and leave no entry behind.
pub struct TransferEngine {
    store: LedgerStoreHandle,
    config: EngineConfig,
}

impl TransferEngine {
    /// Creates a new `TransferEngine` over the given store.
    pub fn new(store: LedgerStoreHandle, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Executes one transfer.
    ///
    /// `deadline` bounds lock waits and is checked again right before commit; a
    /// transfer that misses it is rolled back with `DeadlineExceeded`.
    #[instrument(
        name = "transfer",
        skip_all,
        fields(request_id = %request.request_id, from = %request.from, to = %request.to, amount = request.amount)
    )]
    pub async fn transfer(&self, request: &TransferRequest, deadline: Option<Instant>) -> Outcome {
        let amount = request.validate().inspect_err(|err| {
            debug!(error = %err, "transfer rejected by validation");
        })?;
        if deadline_passed(deadline) {
            return Err(TransferError::DeadlineExceeded);
        }

        let options = UnitOfWorkOptions {
            lock_timeout: self.lock_wait(deadline),
        };
        let mut uow = self.store.begin(options).await?;

        let outcome = match self.execute(uow.as_mut(), request, amount).await {
            Ok(Decision::Commit(_)) if deadline_passed(deadline) => {
                rollback(uow).await;
                Err(TransferError::DeadlineExceeded)
            }
            Ok(Decision::Commit(outcome)) => match uow.commit().await {
                Ok(()) => outcome,
                Err(err) => Err(err.into()),
            },
            Ok(Decision::Abort(outcome)) => {
                rollback(uow).await;
                outcome
            }
            Err(err) => {
                rollback(uow).await;
                Err(err.into())
            }
        };

        match &outcome {
            Ok(receipt) if receipt.replayed => info!(entry_id = receipt.entry_id, "transfer replayed"),
            Ok(receipt) => info!(entry_id = receipt.entry_id, "transfer completed"),
            Err(err) if err.is_retryable() => error!(error = %err, "transfer aborted"),
            Err(err) => warn!(error = %err, class = ?err.class(), "transfer failed"),
        }
        outcome
    }

    async fn execute(
        &self,
        uow: &mut dyn UnitOfWork,
        request: &TransferRequest,
        amount: Amount,
    ) -> Result<Decision, LedgerError> {
        if self.config.duplicate_policy != DuplicatePolicy::Reexecute {
            match uow.reserve_request(&request.request_id).await? {
                Reservation::Fresh => {}
                Reservation::InFlight => {
                    return Ok(Decision::Abort(Err(TransferError::DuplicateRequest {
                        request_id: request.request_id.clone(),
                        recorded: None,
                    })));
                }
                Reservation::Existing(entry) => {
                    return Ok(Decision::Abort(self.prior_outcome(entry)));
                }
            }
        }

        let Some(from) = uow.account_by_number(&request.from).await? else {
            // No FK-safe row to reference, so nothing is recorded.
            return Ok(Decision::Abort(Err(TransferError::SourceNotFound(
                request.from.clone(),
            ))));
        };

        let Some(to) = uow.account_by_number(&request.to).await? else {
            uow.insert_entry(NewLedgerEntry {
                from_account: from.id,
                to_account: from.id,
                amount: amount.value(),
                status: EntryStatus::Failed,
                request_id: request.request_id.clone(),
            })
            .await?;
            return Ok(Decision::Commit(Err(TransferError::DestinationNotFound(
                request.to.clone(),
            ))));
        };

        // Ascending id order regardless of direction; opposite transfers on the
        // same pair would otherwise deadlock.
        let (first, second) = if from.id < to.id {
            (from.id, to.id)
        } else {
            (to.id, from.id)
        };
        let first_row = uow.lock_account(first).await?;
        let second_row = uow.lock_account(second).await?;
        let (source, destination) = if first == from.id {
            (first_row, second_row)
        } else {
            (second_row, first_row)
        };

        if !source.can_cover(amount.value()) {
            uow.insert_entry(NewLedgerEntry {
                from_account: source.id,
                to_account: destination.id,
                amount: amount.value(),
                status: EntryStatus::Failed,
                request_id: request.request_id.clone(),
            })
            .await?;
            return Ok(Decision::Commit(Err(TransferError::InsufficientFunds {
                available: source.balance,
                requested: amount.value(),
            })));
        }

        let credited = destination
            .balance
            .checked_add(amount.value())
            .ok_or_else(|| {
                LedgerError::Constraint(format!("balance of account {} overflows", destination.id))
            })?;
        uow.update_balance(source.id, source.balance - amount.value())
            .await?;
        uow.update_balance(destination.id, credited).await?;
        let entry_id = uow
            .insert_entry(NewLedgerEntry {
                from_account: source.id,
                to_account: destination.id,
                amount: amount.value(),
                status: EntryStatus::Completed,
                request_id: request.request_id.clone(),
            })
            .await?;

        Ok(Decision::Commit(Ok(TransferReceipt {
            request_id: request.request_id.clone(),
            entry_id,
            from_account: source.id,
            to_account: destination.id,
            amount: amount.value(),
            replayed: false,
        })))
    }

    fn prior_outcome(&self, entry: LedgerEntry) -> Outcome {
        match (self.config.duplicate_policy, entry.status) {
            (DuplicatePolicy::ReturnPrior, EntryStatus::Completed) => Ok(TransferReceipt {
                request_id: entry.request_id,
                entry_id: entry.id,
                from_account: entry.from_account,
                to_account: entry.to_account,
                amount: entry.amount,
                replayed: true,
            }),
            (DuplicatePolicy::ReturnPrior, EntryStatus::Failed) => {
                Err(TransferError::PreviouslyFailed(entry.request_id))
            }
            _ => Err(TransferError::DuplicateRequest {
                request_id: entry.request_id,
                recorded: Some(entry.status),
            }),
        }
    }

    fn lock_wait(&self, deadline: Option<Instant>) -> Duration {
        match deadline {
            Some(deadline) => self
                .config
                .lock_timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.config.lock_timeout,
        }
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

async fn rollback(uow: Box<dyn UnitOfWork>) {
    if let Err(err) = uow.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}
