//! `herald`: run the scheduler and poke at its task table.

mod standins;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use herald_core::domain::{NewTask, TaskKind};
use herald_core::impls::SqliteTaskStore;
use herald_core::observability::{TaskCounts, describe_metrics, init_tracing};
use herald_core::ports::TaskStore;
use herald_core::{HeraldError, Scheduler, Settings, StoreError};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "herald", version, about = "Persistent task queue and scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the tasks table if it does not exist.
    Migrate,

    /// Poll for due tasks until Ctrl-C.
    Run,

    /// Insert a task.
    Enqueue {
        kind: String,

        /// JSON payload handed to the handler.
        #[arg(long)]
        payload: Option<String>,

        /// Run no earlier than this many seconds from now.
        #[arg(long, default_value_t = 0)]
        delay_secs: u64,
    },

    /// Show task counts and the most recent rows.
    Status {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Run a single dispatch pass and exit.
    Once,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Herald(#[from] HeraldError),

    #[error("invalid --payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("--delay-secs is out of range")]
    Delay,
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Herald(e.into())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    describe_metrics();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "herald failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<(), CliError> {
    let settings = Settings::from_env().map_err(HeraldError::from)?;
    let store = Arc::new(SqliteTaskStore::from_database_url(&settings.database_url)?);

    match command {
        Command::Migrate => {
            store.apply_schema()?;
            println!("schema ready at {}", store.path().display());
        }
        Command::Run => {
            let scheduler = scheduler(settings, store)?;
            scheduler
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "could not listen for Ctrl-C");
                    }
                    info!("shutting down");
                })
                .await?;
        }
        Command::Enqueue {
            kind,
            payload,
            delay_secs,
        } => {
            let mut task = NewTask::new(TaskKind::new(kind));
            if let Some(raw) = payload {
                serde_json::from_str::<serde_json::Value>(&raw)?;
                task = task.with_payload(raw);
            }
            if delay_secs > 0 {
                let delay = i64::try_from(delay_secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .ok_or(CliError::Delay)?;
                let at = chrono::Utc::now()
                    .checked_add_signed(delay)
                    .ok_or(CliError::Delay)?;
                task = task.scheduled_at(at);
            }

            let mut session = store.session().await?;
            let id = session.insert(task).await?;
            session.commit().await?;
            println!("enqueued {id}");
        }
        Command::Status { limit } => {
            let mut session = store.session().await?;
            let all = session.list(usize::MAX).await?;
            let counts = TaskCounts::tally(&all, settings.max_attempts);
            println!(
                "pending={} running={} completed={} retrying={} exhausted={}",
                counts.pending, counts.running, counts.completed, counts.retrying, counts.exhausted
            );
            for task in all.iter().take(limit) {
                println!(
                    "{:>10}  {:<26} {:<9} attempts={} scheduled={} {}",
                    task.id.to_string(),
                    task.kind.as_str(),
                    task.status.as_str(),
                    task.attempts,
                    task.scheduled_at.to_rfc3339(),
                    task.last_error.as_deref().unwrap_or_default(),
                );
            }
        }
        Command::Once => {
            let scheduler = scheduler(settings, store)?;
            let report = scheduler.dispatcher().process_pending().await?;
            println!(
                "selected={} completed={} failed={}",
                report.selected, report.completed, report.failed
            );
        }
    }
    Ok(())
}

fn scheduler(settings: Settings, store: Arc<SqliteTaskStore>) -> Result<Scheduler, HeraldError> {
    let scheduler = Scheduler::builder()
        .settings(settings)
        .store(store)
        .capabilities(standins::capabilities())
        .with_builtin_handlers()
        .build()?;
    Ok(scheduler)
}
