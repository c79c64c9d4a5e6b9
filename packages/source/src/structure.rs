//! Structure checker: the single point that forces a table onto an
//! expected column set.

use crash_etl_source_models::{Table, Value};
use serde::{Deserialize, Serialize};

/// How far [`check_structure`] goes in coercing a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    /// Only report missing columns.
    Report,
    /// Add missing columns as nulls, keep extra columns.
    AddOnly,
    /// Add missing columns as nulls, drop extra columns and reorder to the
    /// expected order.
    #[default]
    Strict,
}

/// What one structure check found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureReport {
    /// Which table or stage was checked, for logs.
    pub label: String,
    pub mode: CheckMode,
    /// Expected columns absent from the input, in expected order.
    pub missing: Vec<String>,
    /// Input columns removed by a strict check.
    pub dropped: Vec<String>,
}

impl StructureReport {
    /// Number of columns populated with nulls by this check.
    #[must_use]
    pub fn added(&self) -> usize {
        match self.mode {
            CheckMode::Report => 0,
            CheckMode::AddOnly | CheckMode::Strict => self.missing.len(),
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compares `table` against `expected` and coerces it according to `mode`.
///
/// Every expected column absent from the input is logged as a warning.
/// After a [`CheckMode::Strict`] check the table's columns are exactly
/// `expected`, in that order.
pub fn check_structure<S: AsRef<str>>(
    table: &mut Table,
    expected: &[S],
    mode: CheckMode,
    label: &str,
) -> StructureReport {
    let missing: Vec<String> = expected
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !table.has_column(name))
        .map(str::to_string)
        .collect();

    if !missing.is_empty() {
        log::warn!(
            "{label}: {} expected field(s) missing: {}",
            missing.len(),
            missing.join(", ")
        );
    }

    let mut dropped = Vec::new();
    match mode {
        CheckMode::Report => {}
        CheckMode::AddOnly => {
            for name in &missing {
                table.add_constant_column(name, &Value::Null);
            }
        }
        CheckMode::Strict => {
            dropped = table
                .columns()
                .iter()
                .filter(|c| !expected.iter().any(|e| e.as_ref() == c.as_str()))
                .cloned()
                .collect();
            if !dropped.is_empty() {
                log::debug!("{label}: dropping {} extra field(s)", dropped.len());
            }
            *table = table.select(expected);
        }
    }

    StructureReport {
        label: label.to_string(),
        mode,
        missing,
        dropped,
    }
}
