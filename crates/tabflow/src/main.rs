mod display;
mod menu;
mod prompt;

use std::io;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tabflow_core::{AutomatedPlan, Orchestrator, PipelineConfig, PipelineJob, Scheduler};
use tabflow_parser::{SourceRequest, TableSelection};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::menu::Menu;

#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive extract/transform/load for tabular files", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./tabflow.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the interactive menu (default)
    Interactive,
    /// Run the automated pipeline once and exit
    Run(RunArgs),
    /// Run the automated pipeline on a fixed interval until Ctrl+C
    Schedule(ScheduleArgs),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Source file; defaults to schedule.default_source
    #[arg(long)]
    source: Option<PathBuf>,
    /// Table name or 1-based position for SQLite sources
    #[arg(long)]
    table: Option<String>,
}

#[derive(Args, Debug, Default)]
struct ScheduleArgs {
    /// Stop after this many runs
    #[arg(long)]
    runs: Option<usize>,
    /// Run once at startup instead of waiting a full interval
    #[arg(long)]
    now: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Interactive);
    let default_level = match command {
        Command::Interactive => "warn",
        _ => "info",
    };
    init_tracing(cli.log_json, default_level);

    let config = PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    config
        .ensure_directories()
        .context("failed to create pipeline directories")?;

    match command {
        Command::Interactive => {
            let stdin = io::stdin();
            let mut menu = Menu::new(config, stdin.lock(), io::stdout());
            menu.run().await.context("console I/O failed")
        }
        Command::Run(args) => handle_run(&config, args),
        Command::Schedule(args) => handle_schedule(config, args).await,
    }
}

fn init_tracing(json: bool, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn handle_run(config: &PipelineConfig, args: RunArgs) -> Result<()> {
    let mut request = match args.source {
        Some(path) => SourceRequest::new(path),
        None => config.schedule.source_request(),
    };
    if let Some(table) = args.table.as_deref() {
        request = request.with_table(TableSelection::parse(table));
    }

    let plan = AutomatedPlan::from_schedule(&config.schedule);
    let mut orchestrator = Orchestrator::from_config(config);
    let report = orchestrator
        .run_automated(&request, &plan)
        .with_context(|| format!("pipeline run failed for {}", request.path.display()))?;

    info!(
        run_id = %report.run_id,
        rows_loaded = report.rows_loaded,
        rows_written = report.rows_written,
        output = ?report.output_path,
        "Pipeline run complete"
    );
    match &report.output_path {
        Some(path) => println!("{}", path.display()),
        None => println!("source had no rows; nothing written"),
    }
    Ok(())
}

async fn handle_schedule(mut config: PipelineConfig, args: ScheduleArgs) -> Result<()> {
    if args.now {
        config.schedule.run_immediately = true;
    }
    let mut job = PipelineJob::from_config(&config);
    let mut scheduler = Scheduler::from_config(&config.schedule, Instant::now());
    if let Some(runs) = args.runs {
        scheduler = scheduler.with_max_runs(runs);
    }

    info!(
        source = %job.request().path.display(),
        interval_secs = config.schedule.interval_secs,
        "Scheduling automated pipeline; press Ctrl+C to stop"
    );
    let summary = scheduler.run_until_ctrl_c(&mut job).await;
    println!(
        "{} runs ({} failed, {} deferred)",
        summary.runs, summary.failures, summary.deferred
    );
    Ok(())
}
