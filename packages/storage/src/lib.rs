#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Access to the externally-owned store holding the raw jurisdiction
//! extracts and receiving the staging tables.
//!
//! Two backends implement [`Store`]: [`local::LocalStore`] for a directory
//! tree and [`s3::S3Store`] for an S3-compatible bucket. Either is wrapped
//! in [`retry::RetryingStore`] so that transient failures are retried with
//! bounded exponential backoff before surfacing as a [`StorageError`].
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |---|---|
//! | `CRASH_ETL_BACKEND` | `local` or `s3` (inferred from the base path when unset) |
//! | `CRASH_ETL_BASE_PATH` | Directory or `s3://bucket/prefix` holding the raw extracts |
//! | `CRASH_ETL_OUTPUT_PATH` | Destination for the staging tables (defaults to the base path) |
//! | `CRASH_ETL_WORK_DIR` | Local scratch directory for columnar files |
//! | `AWS_ENDPOINT_URL` | S3-compatible endpoint |
//! | `AWS_REGION` | Region (defaults to `auto` with a custom endpoint) |
//! | `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` | Static credentials |

pub mod config;
pub mod local;
pub mod paths;
pub mod retry;
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use strum_macros::{AsRefStr, Display};

pub use config::{Backend, StoreConfig};
pub use retry::{RetryPolicy, RetryingStore};

/// The kind of store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum StorageOperation {
    Get,
    Put,
    List,
}

/// Errors that can occur reading from or writing to a store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A backend call failed.
    #[error("Failed to {operation} {path}: {source}")]
    Backend {
        /// Full location of the object or prefix.
        path: String,
        operation: StorageOperation,
        /// Whether retrying may succeed.
        transient: bool,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The object does not exist.
    #[error("Failed to {operation} {path}: not found")]
    NotFound {
        path: String,
        operation: StorageOperation,
    },

    /// A required configuration value is missing.
    #[error("Missing configuration value: {name}")]
    MissingConfig { name: String },

    /// A configuration value is malformed.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Local I/O outside of a store call (reading the config file, the
    /// work directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the failed operation is worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Backend { transient: true, .. })
    }

    /// The location the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Backend { path, .. } | Self::NotFound { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The operation that failed, if any.
    #[must_use]
    pub const fn operation(&self) -> Option<StorageOperation> {
        match self {
            Self::Backend { operation, .. } | Self::NotFound { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

/// A flat key/object store.
///
/// Keys are `/`-separated paths relative to the store's base location.
#[async_trait]
pub trait Store: Send + Sync {
    /// Full human-readable location of `key`, used in logs and errors.
    fn location(&self, key: &str) -> String;

    /// Reads a whole object.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Writes (overwrites) a whole object.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;

    /// Lists every key under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Opens the store holding the raw extracts.
///
/// # Errors
///
/// Returns an error if the configured backend cannot be initialised.
pub async fn open_input(config: &StoreConfig) -> Result<Arc<dyn Store>, StorageError> {
    open(config, &config.storage.base_path).await
}

/// Opens the store receiving the staging tables.
///
/// # Errors
///
/// Returns an error if the configured backend cannot be initialised.
pub async fn open_output(config: &StoreConfig) -> Result<Arc<dyn Store>, StorageError> {
    open(config, config.output_path()).await
}

async fn open(config: &StoreConfig, location: &str) -> Result<Arc<dyn Store>, StorageError> {
    let policy = config.retry;
    match config.backend_for(location) {
        Backend::Local => {
            log::info!("Using local store at {location}");
            Ok(Arc::new(RetryingStore::new(
                local::LocalStore::new(location),
                policy,
            )))
        }
        Backend::S3 => {
            let store = s3::S3Store::connect(&config.s3, location).await?;
            log::info!("Using S3 store at {}", store.location(""));
            Ok(Arc::new(RetryingStore::new(store, policy)))
        }
    }
}

/// Joins a base prefix and a key with a single `/`.
#[must_use]
pub fn join_key(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let key = key.trim_start_matches('/');
    match (prefix.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{key}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_key_normalises_slashes() {
        assert_eq!(join_key("base/", "/crash_sa/x.csv"), "base/crash_sa/x.csv");
        assert_eq!(join_key("", "Final/CSV"), "Final/CSV");
        assert_eq!(join_key("base", ""), "base");
    }

    #[test]
    fn only_flagged_backend_errors_are_transient() {
        let transient = StorageError::Backend {
            path: "s3://b/k".to_string(),
            operation: StorageOperation::Get,
            transient: true,
            source: "timeout".into(),
        };
        let missing = StorageError::NotFound {
            path: "s3://b/k".to_string(),
            operation: StorageOperation::Get,
        };
        assert!(transient.is_transient());
        assert!(!missing.is_transient());
        assert_eq!(missing.path(), Some("s3://b/k"));
        assert_eq!(missing.operation(), Some(StorageOperation::Get));
    }

    #[test]
    fn error_message_names_path_and_operation() {
        let err = StorageError::NotFound {
            path: "/data/crash_nz/crash_nz.csv".to_string(),
            operation: StorageOperation::Get,
        };
        assert_eq!(
            err.to_string(),
            "Failed to get /data/crash_nz/crash_nz.csv: not found"
        );
    }
}
