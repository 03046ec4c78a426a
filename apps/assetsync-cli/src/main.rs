//! assetsync - import assets from CSV sources into the asset registry
//!
//! Every configured asset type is read from its source, compared against the
//! registry by fingerprint, and created or updated as needed. Software
//! inventory and supplier associations follow the asset writes.

use assetsync_engine::statistics::RunStatistics;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod run;

use config::AppConfig;
use error::CliResult;
use run::{ImportRun, RunFlags};

/// Asset registry import
#[derive(Parser, Debug)]
#[command(name = "assetsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "conf.yaml")]
    file: PathBuf,

    /// Log what would change without writing to the registry
    #[arg(long)]
    dryrun: bool,

    /// Number of assets processed in parallel (1-10)
    #[arg(long, value_name = "N")]
    concurrent: Option<usize>,

    /// Update assets even when their fingerprint is unchanged
    #[arg(long)]
    forceupdates: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "info,assetsync=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Err(e) = run(cli).await {
        e.print();
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = AppConfig::load(&cli.file)?;
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    if let Some(concurrent) = cli.concurrent {
        config.concurrency = concurrent;
    }

    tracing::info!(
        file = %cli.file.display(),
        version = env!("CARGO_PKG_VERSION"),
        dry_run = cli.dryrun,
        concurrency = config.concurrency,
        "starting asset import"
    );

    let flags = RunFlags {
        dry_run: cli.dryrun,
        force_updates: cli.forceupdates,
    };
    let import = ImportRun::new(config, flags);
    let stats = import.execute().await?;
    tracing::info!(run_id = %import.run_id(), "asset import finished");
    print_summary(&stats, cli.dryrun);
    Ok(())
}

fn print_summary(stats: &RunStatistics, dry_run: bool) {
    println!();
    if dry_run {
        println!("Dry run summary (nothing was written):");
    } else {
        println!("Import summary:");
    }
    println!("  {:<32} {}", "assets_processed", stats.assets_processed);
    for (counter, count) in stats.non_zero() {
        println!("  {:<32} {count}", counter.as_str());
    }
    println!("Elapsed: {}s", stats.duration_seconds);
}
