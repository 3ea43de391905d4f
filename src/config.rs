use crate::application::engine::EngineConfig;
use crate::application::worker::DispatchConfig;
use crate::domain::transfer::DuplicatePolicy;
use crate::error::ConfigError;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// How the driver hands transfers to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// Execute each transfer inline and wait for its outcome.
    #[default]
    Sync,
    /// Enqueue each transfer on the worker pool.
    Async,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Transfers funds between ledger accounts", long_about = None)]
pub struct Cli {
    /// Input transfers CSV file (`request_id,from,to,amount`)
    pub transfers: PathBuf,

    /// Accounts to seed before processing (`account_number,name,email,phone,balance`)
    #[arg(long)]
    pub accounts: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Mode::Sync)]
    pub mode: Mode,

    /// Write the ledger history report to this path
    #[arg(long)]
    pub ledger_out: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "LEDGER_DB_PATH")]
    pub db_path: Option<PathBuf>,

    #[arg(long, env = "WORKER_COUNT", default_value_t = 10)]
    pub workers: usize,

    /// Bounded queue capacity of the worker pool
    #[arg(long, env = "WORKER_POOL_SIZE", default_value_t = 100)]
    pub queue_capacity: usize,

    #[arg(long, env = "LOCK_TIMEOUT_MS", default_value_t = 5000)]
    pub lock_timeout_ms: u64,

    /// Deadline for each transfer, measured from intake
    #[arg(long, env = "JOB_TIMEOUT_MS")]
    pub job_timeout_ms: Option<u64>,

    /// How a repeated request id is handled. The default (return-prior) is
    /// provisional until the product decision on duplicates is made.
    #[arg(long, env = "DUPLICATE_POLICY", value_enum, default_value_t = DuplicatePolicy::ReturnPrior)]
    pub duplicate_policy: DuplicatePolicy,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

/// Validated runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub dispatch: DispatchConfig,
    pub mode: Mode,
    pub log_level: String,
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        if cli.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if cli.queue_capacity == 0 {
            return Err(ConfigError::NoQueueCapacity);
        }
        if cli.lock_timeout_ms == 0 {
            return Err(ConfigError::ZeroLockTimeout);
        }

        Ok(Self {
            engine: EngineConfig {
                lock_timeout: Duration::from_millis(cli.lock_timeout_ms),
                duplicate_policy: cli.duplicate_policy,
            },
            dispatch: DispatchConfig {
                workers: cli.workers,
                queue_capacity: cli.queue_capacity,
                job_timeout: cli.job_timeout_ms.map(Duration::from_millis),
            },
            mode: cli.mode,
            log_level: cli.log_level.clone(),
            log_json: cli.log_json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("payledger").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_cli(&parse(&["transfers.csv"])).unwrap();

        assert_eq!(config.dispatch, DispatchConfig::default());
        assert_eq!(config.engine.lock_timeout, Duration::from_millis(5000));
        assert_eq!(config.engine.duplicate_policy, DuplicatePolicy::ReturnPrior);
        assert_eq!(config.mode, Mode::Sync);
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&[
            "transfers.csv",
            "--mode",
            "async",
            "--workers",
            "4",
            "--job-timeout-ms",
            "250",
            "--duplicate-policy",
            "reject",
        ]);
        let config = AppConfig::from_cli(&cli).unwrap();

        assert_eq!(config.mode, Mode::Async);
        assert_eq!(config.dispatch.workers, 4);
        assert_eq!(config.dispatch.job_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.engine.duplicate_policy, DuplicatePolicy::Reject);
    }

    #[test]
    fn test_rejects_empty_pool() {
        let cli = parse(&["transfers.csv", "--workers", "0"]);
        assert_eq!(AppConfig::from_cli(&cli), Err(ConfigError::NoWorkers));

        let cli = parse(&["transfers.csv", "--queue-capacity", "0"]);
        assert_eq!(AppConfig::from_cli(&cli), Err(ConfigError::NoQueueCapacity));
    }
}
