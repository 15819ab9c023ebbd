use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use bujo::cli::{Cli, Commands};
use bujo::{Config, Profile, Store};

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let config = Config::load_with_profile(profile)?;

    // File logging: stderr is unusable once the TUI owns the terminal.
    // The guard must stay alive for the whole run or buffered lines are lost.
    let _log_guard = init_tracing(profile)?;

    match cli.command.unwrap_or(Commands::Tui) {
        // Bootstrap authenticates with admin credentials, not the user account
        Commands::Bootstrap { email, password } => {
            bujo::cli::handle_bootstrap(&config, email, password)?;
        }
        command => {
            // Everything else needs a logged-in user session. A failed login
            // is fatal here, before any UI is shown.
            let mut store = Store::new(&config.base_url, config.request_timeout())?;
            store.login(&config.identity, &config.password)?;

            match command {
                Commands::Tui => {
                    let app = bujo::tui::App::new(config, store)?;
                    bujo::tui::run_event_loop(app)?;
                }
                Commands::PrepareDay { date } => {
                    bujo::cli::handle_prepare_day(&store, date)?;
                }
                Commands::AddTask {
                    title,
                    context,
                    due,
                    priority,
                } => {
                    bujo::cli::handle_add_task(&store, title, context, due, priority)?;
                }
                Commands::Bootstrap { .. } => unreachable!("handled above"),
            }
        }
    }

    Ok(())
}

fn init_tracing(profile: Profile) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = bujo::utils::get_data_dir(profile)
        .ok_or_else(|| color_eyre::eyre::eyre!("Could not determine data directory"))?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "bujo.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bujo=info")))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}
