//! Reads a jurisdiction's raw extracts from the backing store into one
//! crash-level [`Table`].
//!
//! The primary crash files are concatenated, then lookup tables are
//! left-joined and unit tables are summarised (one count column per unit
//! category) and joined on. Every cell is read as text; typing happens in
//! the harmoniser.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crash_etl_crash_models::Jurisdiction;
use crash_etl_source_models::{Table, Value};
use crash_etl_storage::Store;

use crate::error::LoadError;
use crate::source_def::{ExtractFormat, JurisdictionDefinition};

/// Loads raw extracts through a [`Store`].
pub struct ExtractLoader {
    store: Arc<dyn Store>,
    work_dir: PathBuf,
}

impl ExtractLoader {
    /// `work_dir` receives local copies of columnar files before they are
    /// read.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            work_dir: work_dir.into(),
        }
    }

    /// Loads and assembles the crash-level table for `definition`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if a file cannot be fetched or parsed.
    pub async fn load(&self, definition: &JurisdictionDefinition) -> Result<Table, LoadError> {
        let extract = &definition.extract;
        let label = definition.id.prefix();

        let mut table = self
            .read_all(definition.id, extract.format, &extract.expand(&extract.path))
            .await?;
        log::info!("[{label}] Loaded {} crash rows", table.len());

        for join in &extract.joins {
            let lookup = self
                .read_all(definition.id, extract.format, &extract.expand(&join.path))
                .await?;
            log::info!("[{label}] Joining {} on {}", join.path, join.key);
            left_join(&mut table, &lookup, &join.key, label);
        }

        for pivot in &extract.pivots {
            let units = self
                .read_all(definition.id, extract.format, &extract.expand(&pivot.path))
                .await?;
            let counts = pivot_counts(&units, &pivot.key, &pivot.category);
            log::info!(
                "[{label}] Summarised {} unit rows into {} categories",
                units.len(),
                counts.columns().len().saturating_sub(1)
            );
            left_join(&mut table, &counts, &pivot.key, label);
        }

        Ok(table)
    }

    async fn read_all(
        &self,
        jurisdiction: Jurisdiction,
        format: ExtractFormat,
        paths: &[String],
    ) -> Result<Table, LoadError> {
        let mut tables = Vec::with_capacity(paths.len());
        for path in paths {
            let table = match format {
                ExtractFormat::Csv => {
                    let bytes = self.store.get(path).await?;
                    parse_csv(&bytes, &self.store.location(path))?
                }
                ExtractFormat::Parquet => self.read_parquet_dir(jurisdiction, path).await?,
            };
            log::debug!("  {} -> {} rows", self.store.location(path), table.len());
            tables.push(table);
        }
        Ok(Table::concat(tables))
    }

    async fn read_parquet_dir(
        &self,
        jurisdiction: Jurisdiction,
        prefix: &str,
    ) -> Result<Table, LoadError> {
        let keys: Vec<String> = self
            .store
            .list(prefix)
            .await?
            .into_iter()
            .filter(|k| Path::new(k).extension().is_some_and(|e| e == "parquet"))
            .collect();
        if keys.is_empty() {
            return Err(LoadError::Empty {
                path: self.store.location(prefix),
            });
        }

        let local_dir = self.work_dir.join(jurisdiction.as_ref());
        let mut files = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let bytes = self.store.get(key).await?;
            let local = local_dir.join(format!("part-{i:05}.parquet"));
            if let Some(parent) = local.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&local, bytes).await?;
            files.push(local);
        }

        let location = self.store.location(prefix);
        tokio::task::spawn_blocking(move || {
            read_parquet(&files).map_err(|source| LoadError::Parquet {
                path: location,
                source,
            })
        })
        .await?
    }
}

/// Parses delimited text with a header row. Blank cells become nulls.
///
/// # Errors
///
/// Returns [`LoadError::Csv`] if the text is malformed.
pub fn parse_csv(bytes: &[u8], location: &str) -> Result<Table, LoadError> {
    let csv_error = |source| LoadError::Csv {
        path: location.to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut table = Table::new(&headers);
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        table.push_row(record.iter().map(Value::text).collect());
    }
    Ok(table)
}

/// Reads Parquet files through an in-memory `DuckDB` connection, casting
/// every column to text. Files with differing schemas are unioned by
/// column name.
///
/// # Errors
///
/// Returns the `DuckDB` error if a file cannot be read.
pub fn read_parquet(files: &[PathBuf]) -> Result<Table, duckdb::Error> {
    let conn = duckdb::Connection::open_in_memory()?;

    let list = files
        .iter()
        .map(|f| format!("'{}'", f.to_string_lossy().replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ");
    let source = format!("read_parquet([{list}], union_by_name = true)");

    let mut columns: Vec<String> = Vec::new();
    {
        let mut stmt = conn.prepare(&format!("DESCRIBE SELECT * FROM {source}"))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            columns.push(row.get(0)?);
        }
    }
    if columns.is_empty() {
        return Ok(Table::default());
    }

    let select = columns
        .iter()
        .map(|c| format!("CAST(\"{}\" AS VARCHAR)", c.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(", ");

    let mut table = Table::new(&columns);
    let mut stmt = conn.prepare(&format!("SELECT {select} FROM {source}"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            let cell: Option<String> = row.get(i)?;
            values.push(cell.map_or(Value::Null, Value::text));
        }
        table.push_row(values);
    }
    Ok(table)
}

/// Left-joins `lookup` onto `table` on `key`.
///
/// Each crash row takes the first matching lookup row, so the join never
/// multiplies crash rows; later duplicates are counted and logged. Lookup
/// columns that already exist in `table` are not copied.
pub fn left_join(table: &mut Table, lookup: &Table, key: &str, label: &str) {
    let mut first: HashMap<String, usize> = HashMap::with_capacity(lookup.len());
    let mut duplicates = 0usize;
    for (i, value) in lookup.column_values(key).enumerate() {
        if let Some(k) = value.as_raw() {
            if first.contains_key(&k) {
                duplicates += 1;
            } else {
                first.insert(k, i);
            }
        }
    }
    if duplicates > 0 {
        log::warn!("[{label}] {duplicates} duplicate {key} row(s) in lookup ignored");
    }

    let matches: Vec<Option<usize>> = table
        .column_values(key)
        .map(|v| v.as_raw().and_then(|k| first.get(&k).copied()))
        .collect();
    let unmatched = matches.iter().filter(|m| m.is_none()).count();
    if unmatched > 0 {
        log::debug!("[{label}] {unmatched} row(s) have no {key} match");
    }

    let new_columns: Vec<String> = lookup
        .columns()
        .iter()
        .filter(|c| c.as_str() != key)
        .filter(|c| {
            let clash = table.has_column(c);
            if clash {
                log::debug!("[{label}] keeping existing column {c}");
            }
            !clash
        })
        .cloned()
        .collect();

    for column in new_columns {
        let values = matches
            .iter()
            .map(|m| m.map_or(Value::Null, |row| lookup.get(row, &column).clone()))
            .collect();
        table.set_column(&column, values);
    }
}

/// Counts unit rows per `(key, category)` and widens the result to one
/// integer column per category, with the key column first.
///
/// Units with a missing key or category are ignored.
#[must_use]
pub fn pivot_counts(units: &Table, key: &str, category: &str) -> Table {
    let mut counts: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    let mut categories: BTreeSet<String> = BTreeSet::new();

    for (k, c) in units.column_values(key).zip(units.column_values(category)) {
        let (Some(k), Some(c)) = (k.as_raw(), c.as_raw()) else {
            continue;
        };
        *counts.entry(k).or_default().entry(c.clone()).or_default() += 1;
        categories.insert(c);
    }

    let mut columns = vec![key.to_string()];
    columns.extend(categories.iter().cloned());
    let mut table = Table::new(&columns);
    for (k, per_category) in counts {
        let mut row = vec![Value::Text(k)];
        row.extend(
            categories
                .iter()
                .map(|c| Value::Int(per_category.get(c).copied().unwrap_or(0))),
        );
        table.push_row(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use crash_etl_storage::local::LocalStore;

    use super::*;
    use crate::source_def::parse_jurisdiction_toml;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "crash_etl_loader_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        let mut t = Table::new(columns);
        for row in rows {
            t.push_row(row.iter().map(|v| Value::text(*v)).collect());
        }
        t
    }

    #[test]
    fn csv_blank_cells_are_null() {
        let t = parse_csv(b"\xef\xbb\xbfREPORT_ID,Suburb\n1,ADELAIDE\n2,\n", "mem").unwrap();
        assert_eq!(t.columns(), ["REPORT_ID", "Suburb"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "Suburb"), &Value::text("ADELAIDE"));
        assert_eq!(t.get(1, "Suburb"), &Value::Null);
    }

    #[test]
    fn left_join_takes_first_match_and_keeps_row_count() {
        let mut crashes = table(&["ACCIDENT_NO", "SEVERITY"], &[&["A1", "2"], &["A2", "3"]]);
        let nodes = table(
            &["ACCIDENT_NO", "LGA_NAME", "SEVERITY"],
            &[&["A1", "MELBOURNE", "9"], &["A1", "YARRA", "9"]],
        );
        left_join(&mut crashes, &nodes, "ACCIDENT_NO", "VIC");
        assert_eq!(crashes.len(), 2);
        assert_eq!(crashes.get(0, "LGA_NAME"), &Value::text("MELBOURNE"));
        assert_eq!(crashes.get(1, "LGA_NAME"), &Value::Null);
        assert_eq!(crashes.get(0, "SEVERITY"), &Value::text("2"));
    }

    #[test]
    fn pivot_counts_units_per_category() {
        let units = table(
            &["REPORT_ID", "Unit Type", "Unit No"],
            &[
                &["1", "Motor Cars - Sedan", "1"],
                &["1", "Motor Cars - Sedan", "2"],
                &["1", "OMNIBUS", "3"],
                &["2", "Pedal Cycle", "1"],
                &["3", "", "1"],
            ],
        );
        let pivot = pivot_counts(&units, "REPORT_ID", "Unit Type");
        assert_eq!(
            pivot.columns(),
            ["REPORT_ID", "Motor Cars - Sedan", "OMNIBUS", "Pedal Cycle"]
        );
        assert_eq!(pivot.len(), 2);
        assert_eq!(pivot.get(0, "Motor Cars - Sedan"), &Value::Int(2));
        assert_eq!(pivot.get(0, "OMNIBUS"), &Value::Int(1));
        assert_eq!(pivot.get(1, "OMNIBUS"), &Value::Int(0));
    }

    #[tokio::test]
    async fn loads_yearly_csv_with_unit_pivot() {
        let root = temp_root("sa");
        let store = LocalStore::new(&root);
        for year in [2017, 2018] {
            store
                .put(
                    &format!("crash_sa/road-crash-data-{year}/{year}_DATA_SA_Crash.csv"),
                    format!("REPORT_ID,Year\n{year}-1,{year}\n").into_bytes(),
                )
                .await
                .unwrap();
            store
                .put(
                    &format!("crash_sa/road-crash-data-{year}/{year}_DATA_SA_Units.csv"),
                    format!("REPORT_ID,Unit Type,Unit No\n{year}-1,OMNIBUS,1\n").into_bytes(),
                )
                .await
                .unwrap();
        }

        let def = parse_jurisdiction_toml(
            r#"
            id = "sa"
            name = "South Australia"
            row_id = "REPORT_ID"

            [extract]
            path = "crash_sa/road-crash-data-{year}/{year}_DATA_SA_Crash.csv"
            years = { start = 2017, end = 2018 }
            pivots = [
                { path = "crash_sa/road-crash-data-{year}/{year}_DATA_SA_Units.csv", key = "REPORT_ID", category = "Unit Type" },
            ]

            [date_time]
            type = "coded"
            year = "Year"
            "#,
        )
        .unwrap();

        let loader = ExtractLoader::new(Arc::new(store), root.join("work"));
        let t = loader.load(&def).await.unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "REPORT_ID"), &Value::text("2017-1"));
        assert_eq!(t.get(1, "OMNIBUS"), &Value::Int(1));
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn reads_parquet_directory_as_text() {
        let root = temp_root("parquet");
        let source_dir = root.join("raw").join("crash_qld").join("crash");
        std::fs::create_dir_all(&source_dir).unwrap();
        let target = source_dir.join("part-0.parquet");
        {
            let conn = duckdb::Connection::open_in_memory().unwrap();
            conn.execute_batch(&format!(
                "COPY (SELECT 42 AS Crash_Ref_Number, 3.0 AS Count_Unit_Car, \
                 CAST(NULL AS VARCHAR) AS Loc_Suburb) TO '{}' (FORMAT PARQUET)",
                target.display()
            ))
            .unwrap();
        }

        let store = LocalStore::new(root.join("raw"));
        let loader = ExtractLoader::new(Arc::new(store), root.join("work"));
        let t = loader
            .read_parquet_dir(Jurisdiction::Qld, "crash_qld/crash")
            .await
            .unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(0, "Crash_Ref_Number"), &Value::text("42"));
        assert_eq!(t.get(0, "Count_Unit_Car"), &Value::text("3.0"));
        assert_eq!(t.get(0, "Loc_Suburb"), &Value::Null);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn empty_parquet_directory_is_an_error() {
        let root = temp_root("parquet_empty");
        let store = LocalStore::new(&root);
        store.put("crash_wa/crash/README", b"x".to_vec()).await.unwrap();
        let loader = ExtractLoader::new(Arc::new(store), root.join("work"));
        let err = loader
            .read_parquet_dir(Jurisdiction::Wa, "crash_wa/crash")
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Empty { .. }));
        let _ = std::fs::remove_dir_all(root);
    }
}
