//! Typed harmonisation errors.

use crash_etl_crash_models::Jurisdiction;

use crate::vocabulary::DictionaryField;

/// A raw source value that has no entry in the dictionary for its field.
///
/// Always fatal for the jurisdiction being harmonised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{jurisdiction}: no canonical {field} for raw value {raw_value:?}")]
pub struct UnmappedValueError {
    pub jurisdiction: Jurisdiction,
    pub field: DictionaryField,
    pub raw_value: String,
}

/// A source field that could not be read as the type it feeds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{column}: cannot read {raw_value:?} as {expected} (row {row_ref})")]
pub struct FieldCoercionError {
    pub column: String,
    /// Native identifier of the offending source row, or its position when
    /// the row id itself is missing.
    pub row_ref: String,
    pub raw_value: String,
    pub expected: &'static str,
}

/// Errors from the coordinate projection service.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Invalid projection definition {name}: {message}")]
    Definition { name: String, message: String },
    #[error("Failed to project ({x}, {y}) from {name}: {message}")]
    Transform {
        name: String,
        x: f64,
        y: f64,
        message: String,
    },
}

/// Errors reading jurisdiction definitions.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("Invalid jurisdiction definition: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Unknown jurisdiction {0:?}")]
    UnknownJurisdiction(String),
}

/// Errors loading a jurisdiction's raw extract.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Storage(#[from] crash_etl_storage::StorageError),
    #[error("Failed to parse {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to read parquet {path}: {source}")]
    Parquet {
        path: String,
        #[source]
        source: duckdb::Error,
    },
    #[error("No extract files found under {path}")]
    Empty { path: String },
    #[error("Extract reader task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Any failure that aborts one jurisdiction's harmonisation.
#[derive(Debug, thiserror::Error)]
pub enum HarmoniseError {
    #[error(transparent)]
    Unmapped(#[from] UnmappedValueError),
    #[error(transparent)]
    Coercion(#[from] FieldCoercionError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl HarmoniseError {
    /// Whether this error is the result of a record-level data problem,
    /// rather than a mapping gap or infrastructure failure.
    #[must_use]
    pub const fn is_record_level(&self) -> bool {
        matches!(self, Self::Coercion(_))
    }
}
