//! Application layer containing the transfer orchestration.
//!
//! `TransferEngine` executes one transfer as a unit of work against a Ledger Store.
//! `WorkerPool` drains a bounded queue of transfer jobs with a fixed set of `tokio`
//! workers, and `TransferIntake` chooses between the two paths for each request.

pub mod engine;
pub mod intake;
pub mod reconcile;
pub mod worker;
