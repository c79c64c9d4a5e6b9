#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Merge and normalize orchestration.
//!
//! Loads and harmonises every requested jurisdiction concurrently, applies
//! the batch failure policy, concatenates the canonical tables in
//! jurisdiction order, assigns `description_id`, projects the six output
//! tables, deduplicates them and writes each as CSV and Parquet.

pub mod merge;
pub mod writer;

use std::path::PathBuf;
use std::sync::Arc;

use crash_etl_crash_models::Jurisdiction;
use crash_etl_source::progress::ProgressCallback;
use crash_etl_source::registry::all_jurisdictions;
use crash_etl_source::{
    CoercionPolicy, CoordinateProjector, ExtractLoader, HarmoniseError, HarmoniseOutcome,
    HarmoniseReport, Harmoniser, JurisdictionDefinition, LoadError, Vocabulary,
};
use crash_etl_source_models::OutputTable;
use crash_etl_storage::{StorageError, Store};
use futures::StreamExt as _;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use merge::{merge, project, split};
pub use writer::{OutputFormat, to_csv, write_parquet, write_tables};

/// Env var holding a comma-separated jurisdiction filter.
pub const JURISDICTIONS_ENV: &str = "CRASH_ETL_JURISDICTIONS";

/// Errors that stop a staging run.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("{jurisdiction} failed: {source}")]
    Jurisdiction {
        jurisdiction: Jurisdiction,
        #[source]
        source: HarmoniseError,
    },
    #[error("Duplicate crash_id {0:?} in merged table")]
    DuplicateCrashId(String),
    #[error("Failed to write {table}: {message}")]
    Write { table: OutputTable, message: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Staging task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Parquet write failed: {0}")]
    Parquet(#[from] duckdb::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("No jurisdictions left to merge")]
    NoJurisdictions,
}

/// What a failed jurisdiction does to the rest of the batch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failure aborts the run before anything is written.
    #[default]
    AbortBatch,
    /// Failed jurisdictions are logged and left out of the merge.
    ExcludeJurisdiction,
}

/// Tunables for one staging run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub failure_policy: FailurePolicy,
    pub coercion_policy: CoercionPolicy,
    /// Jurisdictions loaded and harmonised at once.
    pub jobs: usize,
    pub formats: Vec<OutputFormat>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            coercion_policy: CoercionPolicy::default(),
            jobs: 2,
            formats: vec![OutputFormat::Csv, OutputFormat::Parquet],
        }
    }
}

/// Summary of a completed staging run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Harmonisation report of every merged jurisdiction, in merge order.
    pub jurisdictions: Vec<HarmoniseReport>,
    /// Jurisdictions left out under [`FailurePolicy::ExcludeJurisdiction`].
    pub excluded: Vec<(Jurisdiction, String)>,
    /// Row count of each output table after deduplication.
    pub tables: Vec<(OutputTable, usize)>,
    /// Store keys written.
    pub written: Vec<String>,
}

/// Returns the jurisdiction definitions selected by `cli_filter`, falling
/// back to [`JURISDICTIONS_ENV`] and then to every jurisdiction.
#[must_use]
pub fn enabled_jurisdictions(cli_filter: Option<String>) -> Vec<JurisdictionDefinition> {
    let filter = cli_filter.or_else(|| std::env::var(JURISDICTIONS_ENV).ok());
    let all = all_jurisdictions();

    let Some(filter_str) = filter else {
        return all;
    };

    let ids: Vec<String> = filter_str
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    let filtered: Vec<JurisdictionDefinition> = all
        .into_iter()
        .filter(|d| ids.iter().any(|id| id == d.id.as_ref()))
        .collect();

    if filtered.is_empty() {
        log::warn!(
            "No matching jurisdictions found for filter {ids:?}. Available: {}",
            Jurisdiction::all()
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<&str>>()
                .join(", ")
        );
    }

    filtered
}

/// Runs staging against an input and an output store.
pub struct Orchestrator {
    input: Arc<dyn Store>,
    output: Arc<dyn Store>,
    work_dir: PathBuf,
    projector: Arc<dyn CoordinateProjector>,
    options: RunOptions,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        input: Arc<dyn Store>,
        output: Arc<dyn Store>,
        work_dir: impl Into<PathBuf>,
        projector: Arc<dyn CoordinateProjector>,
        options: RunOptions,
    ) -> Self {
        Self {
            input,
            output,
            work_dir: work_dir.into(),
            projector,
            options,
        }
    }

    /// Harmonises `definitions`, merges them in the given order and writes
    /// the six output tables.
    ///
    /// Nothing is written unless every jurisdiction that is kept
    /// harmonised successfully and the merged table is consistent.
    ///
    /// # Errors
    ///
    /// * [`StagingError::Jurisdiction`] for the first failed jurisdiction
    ///   under [`FailurePolicy::AbortBatch`].
    /// * [`StagingError::NoJurisdictions`] if nothing is left to merge.
    /// * [`StagingError::DuplicateCrashId`] if the merged table is
    ///   inconsistent.
    /// * Writer and storage errors.
    pub async fn run(
        &self,
        definitions: Vec<JurisdictionDefinition>,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<RunReport, StagingError> {
        if definitions.is_empty() {
            return Err(StagingError::NoJurisdictions);
        }

        progress.set_total(definitions.len() as u64);
        let loader = ExtractLoader::new(self.input.clone(), self.work_dir.join("extracts"));
        let jobs = self.options.jobs.max(1);

        // Results arrive in definition order. Returning on the first failure
        // drops the stream, so queued jurisdictions are never started.
        let mut results = std::pin::pin!(
            futures::stream::iter(definitions.into_iter().map(|definition| {
                let loader = &loader;
                let progress = progress.clone();
                async move {
                    let id = definition.id;
                    progress.set_message(format!("Harmonising {}", definition.name));
                    let result = self.harmonise_one(loader, definition).await;
                    progress.inc(1);
                    (id, result)
                }
            }))
            .buffered(jobs)
        );

        let mut report = RunReport::default();
        let mut tables = Vec::new();
        while let Some((jurisdiction, result)) = results.next().await {
            match result {
                Ok(outcome) => {
                    log::info!(
                        "[{}] Harmonised {} of {} rows",
                        jurisdiction.prefix(),
                        outcome.report.rows_out,
                        outcome.report.rows_in
                    );
                    report.jurisdictions.push(outcome.report);
                    tables.push(outcome.table);
                }
                Err(source) => match self.options.failure_policy {
                    FailurePolicy::AbortBatch => {
                        progress.finish(format!("{jurisdiction} failed"));
                        return Err(StagingError::Jurisdiction {
                            jurisdiction,
                            source,
                        });
                    }
                    FailurePolicy::ExcludeJurisdiction => {
                        log::error!("Excluding {jurisdiction}: {source}");
                        report.excluded.push((jurisdiction, source.to_string()));
                    }
                },
            }
        }

        if tables.is_empty() {
            progress.finish("Nothing to merge".to_string());
            return Err(StagingError::NoJurisdictions);
        }

        progress.set_message("Merging".to_string());
        let merged = merge(tables)?;
        let outputs = split(&merged);
        report.tables = outputs.iter().map(|(t, rows)| (*t, rows.len())).collect();

        progress.set_message("Writing output tables".to_string());
        report.written = write_tables(
            &self.output,
            &self.work_dir.join("output"),
            &outputs,
            &self.options.formats,
        )
        .await?;

        progress.finish(format!(
            "Staged {} jurisdiction(s) into {} file(s)",
            report.jurisdictions.len(),
            report.written.len()
        ));
        Ok(report)
    }

    async fn harmonise_one(
        &self,
        loader: &ExtractLoader,
        definition: JurisdictionDefinition,
    ) -> Result<HarmoniseOutcome, HarmoniseError> {
        log::info!("[{}] Loading {}", definition.id.prefix(), definition.name);
        let raw = loader.load(&definition).await?;

        let projector = self.projector.clone();
        let policy = self.options.coercion_policy;
        tokio::task::spawn_blocking(move || {
            log::info!("[{}] Harmonising", definition.id.prefix());
            Harmoniser::new(&definition, Vocabulary::embedded(), projector.as_ref(), policy)
                .harmonise(raw)
        })
        .await
        .map_err(LoadError::from)?
    }
}
