//! `license-autoid`: identify pending code matches on a code-inspection server.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]).
//! 2. Load config ([`config::load_config`]) and apply CLI overrides.
//! 3. Connect: HTTP server, or a JSON fixture with `--fixture`.
//! 4. Resolve the project and run the [`Engine`] with the chosen strategy.
//! 5. Render the requested report ([`report`]).
//! 6. Exit `0` (clean), `1` (finished with skipped files) or `2` (did not finish).

mod cli;
mod report;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, ReportFormat};
use license_autoid::client::http::{Connection, HttpClient};
use license_autoid::client::memory::InMemoryClient;
use license_autoid::client::RemoteTreeMatchClient;
use license_autoid::config::{self, Config, ServerConfig};
use license_autoid::engine::{Engine, EngineOptions};
use license_autoid::strategy::IdentificationStrategy;

const EXIT_SKIPPED: i32 = 1;
const EXIT_ABORTED: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = std::env::current_dir()?;
    let mut config: Config = config::load_config(&cwd, cli.config.as_deref())?;
    cli.apply_to(&mut config);

    let project = config
        .run
        .project
        .clone()
        .context("no project given; use --project or set [run].project")?;
    let strategy = config
        .run
        .strategy
        .build(&config.run.program_name, config.run.min_score);
    let options = config.run.engine_options();

    // Ctrl-C stops the walk at the next file boundary
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let code = match &cli.fixture {
        Some(path) => {
            let client = InMemoryClient::from_json_file(path)?;
            identify(client, strategy, &project, options, &cli).await?
        }
        None => {
            let client = HttpClient::new(connection(&config.server)?)?;
            identify(client, strategy, &project, options, &cli).await?
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "license_autoid=info" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn connection(server: &ServerConfig) -> Result<Connection> {
    Ok(Connection {
        base_url: server
            .url
            .clone()
            .context("no server URL; use --server or set [server].url")?,
        username: server
            .username
            .clone()
            .context("no user name; use --user or set [server].username")?,
        password: server
            .password
            .clone()
            .context("no password; set LICENSE_AUTOID_PASSWORD or use --password")?,
        timeout: server.timeout(),
    })
}

/// Run the engine and render its outcome. Returns the process exit code.
async fn identify<C: RemoteTreeMatchClient>(
    client: C,
    strategy: Box<dyn IdentificationStrategy>,
    project: &str,
    options: EngineOptions,
    cli: &Cli,
) -> Result<i32> {
    let strategy_name = strategy.name();

    let mut engine = match Engine::new(client, strategy, project, options).await {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return Ok(EXIT_ABORTED);
        }
    };

    let spinner = if !cli.quiet && !cli.verbose && matches!(cli.report, ReportFormat::Terminal) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
        pb.set_message(format!("identifying {}", engine.project().name));
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let outcome = engine.run().await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let records = engine.identifications_made().records();
    match outcome {
        Ok(run) => {
            match cli.report {
                ReportFormat::Terminal => report::terminal::render(
                    engine.project(),
                    strategy_name,
                    records,
                    &run,
                    cli.verbose,
                    cli.quiet,
                ),
                ReportFormat::Json => {
                    report::json::render(engine.project(), strategy_name, records, &run)?
                }
            }

            if let Some(denied) = run.permission_error() {
                eprintln!("{} {}", "warning:".yellow().bold(), denied);
            }

            Ok(if run.is_clean() { 0 } else { EXIT_SKIPPED })
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            eprintln!(
                "  {} {} identification(s) were recorded before the run stopped",
                "→".cyan(),
                records.len()
            );
            Ok(EXIT_ABORTED)
        }
    }
}
