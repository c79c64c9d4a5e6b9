//! Concatenation and normalization of harmonised jurisdiction tables.

use std::collections::HashSet;

use crash_etl_source::structure::{CheckMode, check_structure};
use crash_etl_source_models::{OutputTable, Table, Value, canonical_field_names};

use crate::StagingError;

/// Concatenates canonical tables in the given order and assigns the
/// `description_id` surrogate by row position.
///
/// Any `description_id` already present is discarded.
///
/// # Errors
///
/// Returns [`StagingError::DuplicateCrashId`] if two rows share a
/// `crash_id`.
pub fn merge(tables: Vec<Table>) -> Result<Table, StagingError> {
    let mut merged = Table::concat(tables);
    check_structure(
        &mut merged,
        &canonical_field_names(),
        CheckMode::Strict,
        "merged",
    );

    let ids = (0..merged.len())
        .map(|row| Value::Int(i64::try_from(row).unwrap_or(i64::MAX)))
        .collect();
    merged.set_column("description_id", ids);

    let mut seen = HashSet::with_capacity(merged.len());
    for value in merged.column_values("crash_id") {
        if let Some(id) = value.as_raw()
            && !seen.insert(id.clone())
        {
            return Err(StagingError::DuplicateCrashId(id));
        }
    }

    log::info!("Merged table contains {} rows", merged.len());
    Ok(merged)
}

/// Projects the merged table onto `table`'s columns and removes exact
/// duplicate rows.
#[must_use]
pub fn project(merged: &Table, table: OutputTable) -> Table {
    let mut out = merged.select(table.fields());
    check_structure(&mut out, table.fields(), CheckMode::Strict, table.as_ref());
    let removed = out.dedup();
    if removed > 0 {
        log::debug!("{table}: removed {removed} duplicate row(s)");
    }
    log::info!("{table} table contains {} rows", out.len());
    out
}

/// Splits the merged table into all six output tables, in write order.
#[must_use]
pub fn split(merged: &Table) -> Vec<(OutputTable, Table)> {
    OutputTable::all()
        .iter()
        .map(|table| (*table, project(merged, *table)))
        .collect()
}
