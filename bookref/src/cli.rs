///
/// This module implements the CLI interface for bookref: command parsing,
/// the async entrypoint and user-visible output.
///
/// All pipeline logic (resolution, downloads, classification) lives in the
/// [`bookref-core`] crate; this module is glue and reporting only.
///
/// ## How To Use
/// - For command-line users: run the `bookref` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`bookref-core`]: ../../bookref-core/
use crate::load_config::load_config;
use anyhow::{Context, Result};
use bookref_core::catalog::{fetch_catalog, load_catalog};
use bookref_core::classify::classify_dir;
use bookref_core::config::DEFAULT_CONCURRENCY;
use bookref_core::http::HttpFetcher;
use bookref_core::pipeline::{self, RunReport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI for bookref: tabulate Book of Reference category 3 counts per project.
#[derive(Parser)]
#[clap(
    name = "bookref",
    version,
    about = "Find, download and classify Book of Reference documents for infrastructure projects"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the project catalog CSV to the configured catalog path
    Catalog {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Resolve, download and classify every project in the catalog
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Restrict the run to these project references (repeatable)
        #[clap(long = "only")]
        only: Vec<String>,
        /// Write the full run report as JSON to this file
        #[clap(long)]
        report: Option<PathBuf>,
    },
    /// Classify documents already stored in a directory and print JSON
    Classify {
        #[clap(long)]
        dir: PathBuf,
        #[clap(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Catalog { config } => {
            let config = load_config(config)?;
            let fetcher = HttpFetcher::new(config.pipeline().timeout())?;
            fetch_catalog(&fetcher, &config.site.base_url, &config.catalog.path)
                .await
                .with_context(|| format!("fetching catalog into {}", config.catalog.path.display()))?;
            println!("Catalog saved to {}", config.catalog.path.display());
            Ok(())
        }
        Commands::Run {
            config,
            only,
            report,
        } => {
            let config = load_config(config)?;
            let pipeline_config = config.pipeline();
            pipeline_config.trace_loaded();

            let mut entities = load_catalog(&config.catalog.path)
                .with_context(|| format!("loading catalog {}", config.catalog.path.display()))?;
            if !only.is_empty() {
                entities.retain(|e| only.contains(&e.id));
                tracing::info!(selected = entities.len(), requested = only.len(), "Restricted run to selected projects");
            }

            let fetcher = HttpFetcher::new(pipeline_config.timeout())?;
            let outcome = pipeline::run(&pipeline_config, &fetcher, &entities).await;
            let run_report = match outcome {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(command = "run", error = %e, "Run failed");
                    return Err(anyhow::Error::new(e));
                }
            };

            print_summary(&run_report);
            if let Some(path) = report {
                std::fs::write(&path, run_report.to_json()?)
                    .with_context(|| format!("writing report {}", path.display()))?;
                println!("Report written to {}", path.display());
            }
            Ok(())
        }
        Commands::Classify { dir, concurrency } => {
            let results = classify_dir(&dir, concurrency)
                .await
                .with_context(|| format!("classifying {}", dir.display()))?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
    }
}

fn print_summary(report: &RunReport) {
    let t = &report.totals;
    println!("Entities:    {}", t.entities);
    println!("Resolved:    {} ({} not found, {} fetch errors)", t.resolved, t.not_found, t.fetch_errors);
    println!("Downloaded:  {} ({} failed)", t.downloaded, t.download_failed);
    println!(
        "Classified:  {} ({} processed, {} unprocessed, {} archived, {} errors)",
        t.classified, t.processed, t.unprocessed, t.archived, t.errors
    );

    if !report.failures.is_empty() {
        println!("\n--- Not processed ---");
        for f in &report.failures {
            match &f.cause {
                Some(cause) => println!("  {} [{}] {}: {}", f.entity_id, f.stage, f.status, cause),
                None => println!("  {} [{}] {}", f.entity_id, f.stage, f.status),
            }
        }
    }

    let retry = report.failed_entity_ids();
    if !retry.is_empty() {
        let args: Vec<String> = retry.iter().map(|id| format!("--only {id}")).collect();
        println!("\nRetry with: {}", args.join(" "));
    }
}
