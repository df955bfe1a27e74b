use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use testcase_vault::{
    config::{Config, LogFormat},
    AppState, StorageResult, StoreOutcome, TestCaseRecord,
};

/// Operator tooling for the test case store.
#[derive(Parser, Debug)]
#[command(name = "testcase-vault", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the vector backend and report schema status
    Health,

    /// Store a test case read from a JSON file
    Store {
        /// Path to the record JSON
        file: PathBuf,
    },

    /// Search stored test cases
    Search {
        /// Free-text query
        query: String,

        /// Maximum number of results
        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// Fetch a test case by exact title
    Get {
        /// Title to look up
        title: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        url = %config.weaviate.url,
        "testcase-vault starting..."
    );

    let state = AppState::from_config(config).context("Failed to initialize components")?;
    state.startup().await;

    let result = run(&state, cli.command).await;
    state.shutdown().await;

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e)
        }
    }
}

/// Execute one command. Returns whether it succeeded.
async fn run(state: &AppState, command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Health => {
            let report = state.health().await;
            print_json(&serde_json::to_value(&report)?)?;
            Ok(report.healthy)
        }
        Command::Store { file } => {
            let record = load_record(&file)?;
            let stored = state.gateway.store(record).await?;
            print_json(&storage_report(&stored))?;
            Ok(stored.outcome() != StoreOutcome::Failed)
        }
        Command::Search { query, limit } => {
            let response = state.search.search(&query, limit).await;
            print_json(&serde_json::to_value(&response)?)?;
            Ok(true)
        }
        Command::Get { title } => match state.search.find_by_title(&title).await {
            Some(found) => {
                print_json(&serde_json::to_value(&found)?)?;
                Ok(true)
            }
            None => {
                eprintln!("No test case titled {:?}", title);
                Ok(false)
            }
        },
    }
}

/// Read a record from a JSON file.
fn load_record(path: &Path) -> anyhow::Result<TestCaseRecord> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid test case JSON in {}", path.display()))
}

/// Per-backend summary suitable for printing.
fn storage_report(result: &StorageResult) -> Value {
    let backends: serde_json::Map<String, Value> = result
        .per_backend
        .iter()
        .map(|(name, outcome)| {
            let entry = match outcome {
                Ok(id) => json!({ "ok": id }),
                Err(e) => json!({ "error": e.to_string() }),
            };
            (name.to_string(), entry)
        })
        .collect();

    json!({
        "record_id": result.record_id,
        "outcome": result.outcome(),
        "backends": backends,
    })
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
