use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::bootstrap::{Bootstrap, BootstrapError};
use crate::config::Config;
use crate::models::{TaskDraft, TaskKind};
use crate::rollover::Rollover;
use crate::store::{Store, StoreError};
use crate::utils::parse_date;

#[derive(Parser)]
#[command(name = "bujo")]
#[command(about = "Bullet journal in the terminal, backed by a PocketBase record store")]
#[command(version)]
pub struct Cli {
    /// Use development mode (separate dev config and log directories)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch interactive TUI (default if no subcommand)
    Tui,
    /// Run the daily rollover: ensure today's page, migrate yesterday's
    /// open todos, materialize routines, reconcile events
    PrepareDay {
        /// Day to prepare (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Quickly add a new task
    AddTask {
        /// Task title
        title: String,
        /// Context name (created if missing)
        #[arg(long, default_value = "Personal")]
        context: String,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
        /// Priority (-5..5)
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    /// Create or update the backend collections (requires admin credentials)
    Bootstrap {
        /// Admin email
        #[arg(long)]
        email: String,
        /// Admin password
        #[arg(long)]
        password: String,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Record store error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Bootstrap error: {0}")]
    BootstrapError(#[from] BootstrapError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
}

/// Handle the prepare-day command
pub fn handle_prepare_day(store: &Store, date: Option<String>) -> Result<(), CliError> {
    let day = match date {
        Some(ref raw) => parse_date(raw)
            .map_err(|e| CliError::DateParseError(format!("Invalid date '{}': {}", raw, e)))?,
        None => chrono::Local::now().date_naive(),
    };

    let summary = Rollover::new(store).prepare_today(day)?;
    println!(
        "Day {} prepared: {} migrated, {} routines materialized, {} events reconciled",
        day.format("%Y-%m-%d"),
        summary.migrated,
        summary.materialized,
        summary.reconciled
    );

    Ok(())
}

/// Handle the add-task command
pub fn handle_add_task(
    store: &Store,
    title: String,
    context: String,
    due: Option<String>,
    priority: i64,
) -> Result<(), CliError> {
    // Validate the due date before touching the store
    let due_date = match due {
        Some(due_str) => {
            parse_date(&due_str).map_err(|e| {
                CliError::DateParseError(format!("Invalid date format '{}': {}", due_str, e))
            })?;
            Some(due_str)
        }
        None => None,
    };

    let context = store.ensure_context(&context, None)?;

    // Position goes to the end of the context's open list (max + 1)
    let open = store.list_tasks(
        Some(&context.id),
        crate::models::StatusFilter::Only(crate::models::TaskStatus::Open),
    )?;
    let max_position = open.iter().map(|t| t.position).fold(0.0_f64, f64::max);

    let mut draft = TaskDraft::new(
        title,
        context.id.clone(),
        store.owner_id()?.to_string(),
        TaskKind::Todo,
    );
    draft.position = max_position + 1.0;
    draft.priority = priority;
    draft.due_date = due_date;

    let task = store.create_task(&draft)?;
    println!("Task created successfully (id: {})", task.id);

    Ok(())
}

/// Handle the bootstrap command
pub fn handle_bootstrap(config: &Config, email: String, password: String) -> Result<(), CliError> {
    let mut bootstrap = Bootstrap::new(&config.base_url, config.request_timeout())?;
    bootstrap.admin_login(&email, &password)?;
    let collections = bootstrap.run()?;
    println!("Bootstrap complete: {}", collections.join(", "));
    Ok(())
}
