#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the crash staging ETL.
//!
//! Uses `indicatif-log-bridge` (via [`crash_etl_cli_utils::init_logger`])
//! so log lines and the jurisdiction progress bar share the terminal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use crash_etl_cli_utils::IndicatifProgress;
use crash_etl_source::{
    CoercionPolicy, ExtractLoader, JurisdictionDefinition, Proj4Projector, Vocabulary,
    audit_vocabulary,
};
use crash_etl_staging::{
    FailurePolicy, JURISDICTIONS_ENV, Orchestrator, OutputFormat, RunOptions, RunReport,
    enabled_jurisdictions,
};
use crash_etl_storage::{StoreConfig, open_input, open_output};

#[derive(Parser)]
#[command(name = "crash_etl", about = "Road crash staging ETL")]
struct Cli {
    /// Path to a TOML store config (see `StoreConfig`)
    #[arg(long, global = true, env = "CRASH_ETL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harmonise, merge and write the six staging tables
    Run {
        /// Comma-separated jurisdiction ids (overrides `CRASH_ETL_JURISDICTIONS`)
        #[arg(long)]
        jurisdictions: Option<String>,
        /// Jurisdictions processed concurrently
        #[arg(long, default_value = "2")]
        jobs: usize,
        /// `abort_batch` or `exclude_jurisdiction`
        #[arg(long, default_value = "abort_batch")]
        failure_policy: FailurePolicy,
        /// `abort` or `skip_record`
        #[arg(long, default_value = "abort")]
        coercion_policy: CoercionPolicy,
        /// Output formats, comma-separated (default: csv,parquet)
        #[arg(long = "format", value_delimiter = ',')]
        formats: Vec<OutputFormat>,
    },
    /// List the configured jurisdictions
    Jurisdictions,
    /// Report raw terms missing from the vocabulary dictionaries
    Audit {
        /// Comma-separated jurisdiction ids (overrides `CRASH_ETL_JURISDICTIONS`)
        #[arg(long)]
        jurisdictions: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = crash_etl_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Jurisdictions => {
            println!("{:<6} {:<8} {:<32} EXTRACT", "ID", "PREFIX", "NAME");
            println!("{}", "-".repeat(72));
            for def in crash_etl_source::registry::all_jurisdictions() {
                println!(
                    "{:<6} {:<8} {:<32} {}",
                    def.id.as_ref(),
                    def.id.prefix(),
                    def.name,
                    def.extract.path
                );
            }
        }
        Commands::Run {
            jurisdictions,
            jobs,
            failure_policy,
            coercion_policy,
            formats,
        } => {
            let config = StoreConfig::load(cli.config.as_deref())?;
            let definitions = selected(jurisdictions)?;

            let options = RunOptions {
                failure_policy,
                coercion_policy,
                jobs,
                formats: if formats.is_empty() {
                    RunOptions::default().formats
                } else {
                    formats
                },
            };

            let input = open_input(&config).await?;
            let output = open_output(&config).await?;
            log::info!(
                "Staging {} jurisdiction(s) from {} into {}",
                definitions.len(),
                config.storage.base_path,
                config.output_path()
            );

            let start = Instant::now();
            let orchestrator = Orchestrator::new(
                input,
                output,
                config.work_dir(),
                Arc::new(Proj4Projector),
                options,
            );
            let progress = IndicatifProgress::jurisdictions_bar(&multi, "Staging");
            let report = orchestrator.run(definitions, progress).await?;

            print_report(&report);
            log::info!("Staging complete in {:.1}s", start.elapsed().as_secs_f64());
        }
        Commands::Audit { jurisdictions } => {
            let config = StoreConfig::load(cli.config.as_deref())?;
            let definitions = selected(jurisdictions)?;
            let input = open_input(&config).await?;
            let loader = ExtractLoader::new(input, config.work_dir().join("extracts"));

            let mut gaps = 0;
            for def in &definitions {
                let raw = loader.load(def).await?;
                let audit = audit_vocabulary(def, Vocabulary::embedded(), &raw);
                println!(
                    "{:<6} {} cell(s) checked, {} unmapped term(s)",
                    def.id.prefix(),
                    audit.cells_checked,
                    audit.distinct_gaps()
                );
                for (field, terms) in &audit.gaps {
                    for (term, count) in terms {
                        println!("       {field:<20} {term:?} x{count}");
                    }
                }
                gaps += audit.distinct_gaps();
            }

            if gaps > 0 {
                return Err(format!("{gaps} unmapped vocabulary term(s)").into());
            }
        }
    }

    Ok(())
}

fn selected(
    filter: Option<String>,
) -> Result<Vec<JurisdictionDefinition>, Box<dyn std::error::Error>> {
    let definitions = enabled_jurisdictions(filter);
    if definitions.is_empty() {
        return Err(format!(
            "No jurisdictions selected (check --jurisdictions or {JURISDICTIONS_ENV})"
        )
        .into());
    }
    log::info!(
        "Selected: {}",
        definitions
            .iter()
            .map(|d| d.id.as_ref())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(definitions)
}

fn print_report(report: &RunReport) {
    println!();
    println!("{:<6} {:>10} {:>10} {:>8} {:>8}", "", "ROWS IN", "ROWS OUT", "SKIPPED", "DRIFT");
    for j in &report.jurisdictions {
        println!(
            "{:<6} {:>10} {:>10} {:>8} {:>8}",
            j.jurisdiction.prefix(),
            j.rows_in,
            j.rows_out,
            j.skipped,
            j.columns_added()
        );
    }
    for (jurisdiction, reason) in &report.excluded {
        println!("{:<6} excluded: {reason}", jurisdiction.prefix());
    }
    println!();
    for (table, rows) in &report.tables {
        println!("{:<12} {rows:>10} rows", table.as_ref());
    }
    println!();
    for key in &report.written {
        println!("wrote {key}");
    }
}
