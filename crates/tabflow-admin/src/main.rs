use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tabflow_core::seed;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tabflow administrative tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the sample customer table as a SQLite database and a CSV file
    SeedSample(SeedSampleArgs),
}

#[derive(Args, Debug)]
struct SeedSampleArgs {
    /// SQLite database to (re)create
    #[arg(long, default_value = "source_data/source.db")]
    db: PathBuf,
    /// CSV copy of the same rows
    #[arg(long, default_value = "source_data/data.csv")]
    csv: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::SeedSample(args) => handle_seed_sample(args),
    }
}

fn handle_seed_sample(args: SeedSampleArgs) -> Result<()> {
    dotenvy::dotenv().ok();

    let (db_rows, csv_rows) = seed::run(&args.db, &args.csv).with_context(|| {
        format!(
            "failed to seed {} and {}",
            args.db.display(),
            args.csv.display()
        )
    })?;

    info!(
        database = %args.db.display(),
        csv = %args.csv.display(),
        db_rows,
        csv_rows,
        "Sample data ready"
    );
    Ok(())
}
