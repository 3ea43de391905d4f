use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payledger::application::engine::TransferEngine;
use payledger::application::intake::TransferIntake;
use payledger::application::reconcile::LedgerReconciler;
use payledger::application::worker::WorkerPool;
use payledger::config::{AppConfig, Cli, Mode};
use payledger::domain::ports::LedgerStoreHandle;
use payledger::error::IntakeError;
use payledger::infrastructure::in_memory::InMemoryLedgerStore;
use payledger::interfaces::csv::account_reader::AccountReader;
use payledger::interfaces::csv::account_writer::AccountWriter;
use payledger::interfaces::csv::ledger_writer::LedgerWriter;
use payledger::interfaces::csv::transfer_reader::TransferReader;
use payledger::logging::init_logging;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli).into_diagnostic()?;
    init_logging(&config.log_level, config.log_json);

    let store = open_store(cli.db_path.as_deref())?;
    if let Some(path) = &cli.accounts {
        seed_accounts(&store, path).await?;
    }

    let engine = Arc::new(TransferEngine::new(Arc::clone(&store), config.engine));
    let reconciler = Arc::new(LedgerReconciler::new(Arc::clone(&store)));
    let pool = Arc::new(WorkerPool::start(
        Arc::clone(&engine),
        reconciler,
        config.dispatch,
    ));
    let intake = TransferIntake::new(engine, Arc::clone(&pool));

    let file = File::open(&cli.transfers).into_diagnostic()?;
    let reader = TransferReader::new(file);
    let mut overloaded = 0u64;
    for row in reader.requests() {
        let request = match row {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "skipping unreadable transfer row");
                continue;
            }
        };

        match config.mode {
            Mode::Sync => {
                let deadline = config.dispatch.job_timeout.map(|t| Instant::now() + t);
                let response = intake.transfer_sync(request, deadline).await;
                match response.outcome {
                    Ok(receipt) => debug!(
                        request_id = %response.request_id,
                        entry_id = receipt.entry_id,
                        replayed = receipt.replayed,
                        "transfer completed"
                    ),
                    Err(e) => warn!(
                        request_id = %response.request_id,
                        class = ?e.class(),
                        error = %e,
                        "transfer failed"
                    ),
                }
            }
            Mode::Async => match intake.transfer_async(request) {
                Ok(ack) => debug!(?ack, "transfer accepted"),
                Err(IntakeError::Overloaded(e)) => {
                    overloaded += 1;
                    warn!(error = %e, "transfer rejected, pool overloaded");
                }
                Err(e) => warn!(error = %e, "transfer rejected"),
            },
        }
    }

    let stats = pool.shutdown().await;
    info!(
        processed = stats.processed,
        completed = stats.completed,
        failed = stats.failed,
        overloaded,
        "intake finished"
    );

    let accounts = store.all_accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(&accounts).into_diagnostic()?;

    if let Some(path) = &cli.ledger_out {
        let history = store.ledger_history(None).await.into_diagnostic()?;
        let file = File::create(path).into_diagnostic()?;
        LedgerWriter::new(file)
            .write_records(&history)
            .into_diagnostic()?;
    }

    Ok(())
}

async fn seed_accounts(store: &LedgerStoreHandle, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    for row in AccountReader::new(file).accounts() {
        let account = match row {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "skipping unreadable account row");
                continue;
            }
        };

        let number = account.account_number.clone();
        if store
            .account_by_number(&number)
            .await
            .into_diagnostic()?
            .is_some()
        {
            debug!(account_number = %number, "account already exists");
            continue;
        }
        if let Err(e) = store.create_account(account).await {
            warn!(account_number = %number, error = %e, "account not created");
        }
    }
    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<&Path>) -> Result<LedgerStoreHandle> {
    use payledger::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            info!(path = %path.display(), "using persistent storage");
            Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?))
        }
        None => Ok(Arc::new(InMemoryLedgerStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<&Path>) -> Result<LedgerStoreHandle> {
    if let Some(path) = db_path {
        warn!(
            path = %path.display(),
            "Persistent storage requested via --db-path, but the 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(Arc::new(InMemoryLedgerStore::new()))
}
