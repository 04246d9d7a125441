use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;
use tracing::{info, warn};

use seqcheck_core::checker::{CheckOptions, Checker, SequentialChecker};
use seqcheck_core::config::SeqcheckConfig;
use seqcheck_core::db::{ChaosDatabase, MemoryDatabase, RedbDatabase};
use seqcheck_core::history::History;
use seqcheck_core::observability::init_tracing;
use seqcheck_core::runner::{run_sequential, RunReport};

#[derive(Parser)]
#[command(name = "seqcheck")]
#[command(about = "Sequential-consistency workload driver and checker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    /// Embedded redb store under the data directory
    Redb,
    /// In-process tables, nothing persisted
    Memory,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the sequential workload and check the resulting history
    Run {
        /// TOML configuration file; SEQCHECK_* variables still apply on top
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for the redb store
        #[arg(long)]
        data_dir: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "redb")]
        backend: Backend,

        /// Concurrent worker processes
        #[arg(long)]
        concurrency: Option<usize>,

        /// Total operations across all workers
        #[arg(long)]
        ops: Option<u64>,

        /// Sub-keys per logical key
        #[arg(long)]
        key_count: Option<usize>,

        /// Tables the sub-keys are spread over
        #[arg(long)]
        table_count: Option<usize>,

        /// Probability of an injected serialization conflict per statement
        #[arg(long)]
        conflict_rate: Option<f64>,

        /// Probability of an injected rollback per statement
        #[arg(long)]
        rollback_rate: Option<f64>,

        /// Probability of an injected ambiguous driver fault per statement
        #[arg(long)]
        ambiguous_rate: Option<f64>,

        /// Seed for read selection and fault injection
        #[arg(long)]
        seed: Option<u64>,

        /// Write the full history as JSON
        #[arg(long)]
        history_out: Option<PathBuf>,
    },
    /// Check a JSON history produced by an earlier run
    Check {
        #[arg(long)]
        history: PathBuf,

        /// Sub-keys per logical key used when the history was recorded
        #[arg(long)]
        key_count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let valid = match cli.command {
        Commands::Run {
            config,
            data_dir,
            backend,
            concurrency,
            ops,
            key_count,
            table_count,
            conflict_rate,
            rollback_rate,
            ambiguous_rate,
            seed,
            history_out,
        } => {
            let mut config = match config {
                Some(path) => SeqcheckConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SeqcheckConfig::from_env()?,
            };
            if let Some(dir) = data_dir {
                config.database.data_dir = dir;
            }
            if let Some(n) = concurrency {
                config.workload.concurrency = n;
            }
            if let Some(n) = ops {
                config.workload.ops = n;
            }
            if let Some(n) = key_count {
                config.workload.key_count = n;
            }
            if let Some(n) = table_count {
                config.workload.table_count = n;
            }
            let faults = &mut config.database.faults;
            if let Some(p) = conflict_rate {
                faults.conflict_rate = p;
            }
            if let Some(p) = rollback_rate {
                faults.rollback_rate = p;
            }
            if let Some(p) = ambiguous_rate {
                faults.ambiguous_rate = p;
            }
            if let Some(seed) = seed {
                config.workload.seed = Some(seed);
                config.database.faults.seed = Some(seed);
            }
            config.validate()?;

            let report = run(backend, &config).await?;
            if let Some(path) = history_out {
                std::fs::write(&path, report.history.to_json()?)
                    .with_context(|| format!("writing history to {}", path.display()))?;
                info!(path = %path.display(), ops = report.history.len(), "Wrote history");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.verdict.valid
        }
        Commands::Check { history, key_count } => {
            let text = std::fs::read_to_string(&history)
                .with_context(|| format!("reading {}", history.display()))?;
            let history = History::from_json(&text)?;
            history.validate().context("history is not well formed")?;

            let verdict =
                SequentialChecker.check(&history, &CheckOptions::with_key_count(key_count))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "outcomes": history.outcome_counts(),
                    "verdict": verdict,
                }))?
            );
            verdict.valid
        }
    };

    if valid {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("History is not sequentially consistent");
        Ok(ExitCode::FAILURE)
    }
}

async fn run(backend: Backend, config: &SeqcheckConfig) -> Result<RunReport> {
    let faults = config.database.faults.clone();
    let report = match backend {
        Backend::Redb => {
            let path = config.database.db_path();
            let store = RedbDatabase::create(&path)
                .with_context(|| format!("opening store at {}", path.display()))?;
            run_sequential(Arc::new(ChaosDatabase::new(store, faults)), config).await?
        }
        Backend::Memory => {
            run_sequential(Arc::new(ChaosDatabase::new(MemoryDatabase::new(), faults)), config)
                .await?
        }
    };
    Ok(report)
}
