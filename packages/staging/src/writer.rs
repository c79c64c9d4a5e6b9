//! Serializes output tables as CSV and Parquet and uploads them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crash_etl_source_models::{ColumnKind, OutputTable, Table, Value, canonical_column};
use crash_etl_storage::Store;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::StagingError;

/// Rows bound per `INSERT` statement.
const INSERT_CHUNK_ROWS: usize = 500;

/// A serialization written for every output table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    /// Store key for `table` in this format, relative to the output root.
    #[must_use]
    pub fn key(self, table: OutputTable) -> String {
        match self {
            Self::Csv => format!("Final/CSV/{table}.csv"),
            Self::Parquet => format!("Final/parquet/{table}.parquet"),
        }
    }
}

/// Renders a table as CSV with a header row. Nulls are empty fields.
///
/// # Errors
///
/// Returns an error if a record cannot be written.
pub fn to_csv(table: &Table, output: OutputTable) -> Result<Vec<u8>, StagingError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|v| v.render().unwrap_or_default()))?;
    }
    writer.into_inner().map_err(|e| StagingError::Write {
        table: output,
        message: e.to_string(),
    })
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn kind_of(column: &str) -> ColumnKind {
    canonical_column(column).map_or(ColumnKind::Text, |c| c.kind)
}

/// Writes `table` to a Parquet file at `path` through an in-memory
/// `DuckDB` table typed from the canonical schema.
///
/// # Errors
///
/// Returns [`StagingError::Parquet`] if any `DuckDB` statement fails.
pub fn write_parquet(table: &Table, path: &Path) -> Result<(), StagingError> {
    let conn = duckdb::Connection::open_in_memory()?;
    let kinds: Vec<ColumnKind> = table.columns().iter().map(|c| kind_of(c)).collect();

    let definition = table
        .columns()
        .iter()
        .zip(&kinds)
        .map(|(c, kind)| format!("{} {}", quote(c), kind.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    conn.execute_batch(&format!("CREATE TABLE staging ({definition})"))?;

    let placeholders = format!("({})", vec!["?"; kinds.len()].join(", "));
    for chunk in table.rows().chunks(INSERT_CHUNK_ROWS) {
        let sql = format!(
            "INSERT INTO staging VALUES {}",
            vec![placeholders.as_str(); chunk.len()].join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;
        for row in chunk {
            for (value, kind) in row.iter().zip(&kinds) {
                bind(&mut stmt, param_idx, value, *kind)?;
                param_idx += 1;
            }
        }
        stmt.raw_execute()?;
    }

    let target = path.to_string_lossy().replace('\'', "''");
    conn.execute_batch(&format!("COPY staging TO '{target}' (FORMAT PARQUET)"))?;
    Ok(())
}

fn bind(
    stmt: &mut duckdb::Statement<'_>,
    idx: usize,
    value: &Value,
    kind: ColumnKind,
) -> Result<(), duckdb::Error> {
    match kind {
        ColumnKind::Integer => stmt.raw_bind_parameter(idx, value.as_int()),
        ColumnKind::Float => stmt.raw_bind_parameter(idx, value.as_float()),
        ColumnKind::Boolean => stmt.raw_bind_parameter(idx, value.as_bool()),
        ColumnKind::Text | ColumnKind::TriState | ColumnKind::LatLong => {
            stmt.raw_bind_parameter(idx, value.render())
        }
    }
}

/// Writes every table in every format to `store`, overwriting existing
/// objects. Returns the keys written.
///
/// # Errors
///
/// Returns an error if serialization or an upload fails.
pub async fn write_tables(
    store: &Arc<dyn Store>,
    work_dir: &Path,
    tables: &[(OutputTable, Table)],
    formats: &[OutputFormat],
) -> Result<Vec<String>, StagingError> {
    let mut written = Vec::with_capacity(tables.len() * formats.len());
    tokio::fs::create_dir_all(work_dir).await?;

    for (output, table) in tables {
        for format in formats {
            let key = format.key(*output);
            let bytes = match format {
                OutputFormat::Csv => to_csv(table, *output)?,
                OutputFormat::Parquet => {
                    let path: PathBuf = work_dir.join(format!("{output}.parquet"));
                    let table = table.clone();
                    let file = path.clone();
                    tokio::task::spawn_blocking(move || write_parquet(&table, &file)).await??;
                    let bytes = tokio::fs::read(&path).await?;
                    tokio::fs::remove_file(&path).await?;
                    bytes
                }
            };
            log::info!("Writing {}", store.location(&key));
            store.put(&key, bytes).await?;
            written.push(key);
        }
    }
    Ok(written)
}
