use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use feedforge::{pipeline, Config, OutputFormat};

#[derive(Parser, Debug)]
#[command(
    name = "feedforge",
    version,
    about = "Scrape job listings into a static RSS/Atom feed"
)]
struct Args {
    /// Configuration file
    #[arg(long, short, value_name = "FILE", default_value = "feedforge.toml")]
    config: PathBuf,

    /// Output file (overrides output.path)
    #[arg(long, short, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format (overrides output.format)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Print the feed to stdout instead of writing the output file
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr so --dry-run output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    if let Some(output) = args.output {
        config.output.path = output;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }

    let now = Utc::now();

    if args.dry_run {
        let (bytes, report) = pipeline::preview(&config, now)
            .await
            .context("Feed generation failed")?;
        std::io::stdout()
            .lock()
            .write_all(&bytes)
            .context("Failed to write feed to stdout")?;
        tracing::info!(
            items = report.published,
            fresh = report.fresh,
            skipped = report.skipped,
            "Dry run complete, output file untouched"
        );
        return Ok(());
    }

    let report = pipeline::run(&config, now).await.with_context(|| {
        format!(
            "Feed generation failed; '{}' was not modified",
            config.output.path.display()
        )
    })?;

    if report.failed_attempts > 0 {
        tracing::warn!(
            failed = report.failed_attempts,
            "Some sources failed and were skipped"
        );
    }
    Ok(())
}
