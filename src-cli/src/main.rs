//! Gleaner command-line shell.
//!
//! This is the thin shell that loads configuration, opens the state database
//! and dispatches subcommands. Harvesting logic lives in the `crates/`
//! directory.

mod app;
mod commands;
mod detached;

use anyhow::Result;
use app::App;
use clap::{Parser, Subcommand};
use gleaner_core::AppConfig;
use gleaner_harvest::{FormSettings, JobOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(name = "gleaner")]
#[command(about = "Harvest applicant resumes from a job's applicant listing", version)]
struct Cli {
    /// Configuration file (defaults to the XDG config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start harvesting a job's applicant listing
    Start {
        /// Applicant listing URL; defaults to the last one used
        url: Option<String>,
        /// First listing page
        #[arg(long)]
        start_page: Option<u32>,
        /// Last listing page
        #[arg(long)]
        end_page: Option<u32>,
    },

    /// Continue a job interrupted while running
    Resume,

    /// Show the last status
    Status {
        #[arg(long)]
        json: bool,
    },

    /// List profiles whose resume could not be retrieved
    Failed {
        #[arg(long)]
        json: bool,
    },

    /// Empty the failed profiles list
    ClearFailed,

    /// Retry every failed profile
    RetryFailed,
}

/// Initialize tracing subscriber for logging
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info,gleaner=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn exit_code(outcome: Option<JobOutcome>) -> ExitCode {
    match outcome {
        Some(JobOutcome::Failed) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    }
}

/// Fill in what was not given on the command line from the last start.
///
/// A start page past the remembered end page moves the end along with it.
fn start_request(
    url: Option<String>,
    start_page: Option<u32>,
    end_page: Option<u32>,
    remembered: FormSettings,
) -> (String, u32, u32) {
    let start = start_page.unwrap_or(remembered.page_range.start);
    let end = end_page.unwrap_or_else(|| remembered.page_range.end.max(start));
    (url.unwrap_or(remembered.target_url), start, end)
}

async fn run(cli: Cli, config: AppConfig) -> Result<ExitCode> {
    let stop_grace = config.harvest.stop_grace();
    let app = App::open(config).await?;

    let code = match cli.command {
        Commands::Start {
            url,
            start_page,
            end_page,
        } => {
            let harvester = app.attached().await?;
            let remembered = harvester.form_settings().await?;
            let (url, start_page, end_page) =
                start_request(url, start_page, end_page, remembered);
            exit_code(commands::start(&harvester, &url, start_page, end_page, stop_grace).await?)
        }
        Commands::Resume => {
            let harvester = app.attached().await?;
            exit_code(commands::resume(&harvester, stop_grace).await?)
        }
        Commands::RetryFailed => {
            let harvester = app.attached().await?;
            exit_code(commands::retry_failed(&harvester, stop_grace).await?)
        }
        Commands::Status { json } => {
            commands::status(&app.detached().await?, json).await?;
            ExitCode::SUCCESS
        }
        Commands::Failed { json } => {
            commands::failed(&app.detached().await?, json).await?;
            ExitCode::SUCCESS
        }
        Commands::ClearFailed => {
            commands::clear_failed(&app.detached().await?).await?;
            ExitCode::SUCCESS
        }
    };

    app.close().await;
    Ok(code)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = App::load_config(cli.config.as_deref())?;
    init_tracing(&config.general.log_filter);

    info!("Starting Gleaner v{}", env!("CARGO_PKG_VERSION"));
    run(cli, config).await
}
