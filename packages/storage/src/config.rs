//! Store configuration, loaded once at startup.
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables:
//!
//! ```toml
//! [storage]
//! backend = "s3"
//! base_path = "s3://crash-data/raw"
//! output_path = "s3://crash-data/staging"
//!
//! [s3]
//! endpoint = "https://example.r2.cloudflarestorage.com"
//! access_key_id = "..."
//! secret_access_key = "..."
//!
//! [retry]
//! max_attempts = 5
//! base_delay_ms = 1000
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{RetryPolicy, StorageError, paths};

/// Storage backend identity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Backend {
    Local,
    S3,
}

impl Backend {
    /// Infers the backend from a location: `s3://` URIs are S3, anything
    /// else is a local path.
    #[must_use]
    pub fn infer(location: &str) -> Self {
        if location.starts_with("s3://") {
            Self::S3
        } else {
            Self::Local
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Explicit backend. When unset it is inferred per location.
    pub backend: Option<Backend>,
    /// Location of the raw extracts.
    pub base_path: String,
    /// Location receiving the staging tables. Defaults to `base_path`.
    pub output_path: Option<String>,
    /// Local scratch directory.
    pub work_dir: Option<PathBuf>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: None,
            base_path: paths::data_dir().to_string_lossy().into_owned(),
            output_path: None,
            work_dir: None,
        }
    }
}

/// `[s3]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3Section {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Storage-backend identity, base paths, credentials and retry policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub storage: StorageSection,
    pub s3: S3Section,
    pub retry: RetryPolicy,
}

impl StoreConfig {
    /// Parses a config from TOML without applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if the TOML is malformed.
    pub fn parse(toml_str: &str) -> Result<Self, StorageError> {
        toml::de::from_str(toml_str).map_err(|e| StorageError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Loads the config file (if given), then applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// environment override is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, StorageError> {
        let mut config = match path {
            Some(path) => {
                log::info!("Loading config from {}", path.display());
                Self::parse(&std::fs::read_to_string(path)?)?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup` (normally the process environment).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if `CRASH_ETL_BACKEND` is not
    /// a known backend.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), StorageError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(backend) = non_empty("CRASH_ETL_BACKEND") {
            self.storage.backend =
                Some(backend.parse().map_err(|_| StorageError::InvalidConfig {
                    message: format!("unknown backend {backend:?}"),
                })?);
        }
        if let Some(base) = non_empty("CRASH_ETL_BASE_PATH") {
            self.storage.base_path = base;
        }
        if let Some(output) = non_empty("CRASH_ETL_OUTPUT_PATH") {
            self.storage.output_path = Some(output);
        }
        if let Some(work) = non_empty("CRASH_ETL_WORK_DIR") {
            self.storage.work_dir = Some(PathBuf::from(work));
        }
        if let Some(endpoint) = non_empty("AWS_ENDPOINT_URL") {
            self.s3.endpoint = Some(endpoint);
        }
        if let Some(region) = non_empty("AWS_REGION") {
            self.s3.region = Some(region);
        }
        if let Some(key) = non_empty("AWS_ACCESS_KEY_ID") {
            self.s3.access_key_id = Some(key);
        }
        if let Some(secret) = non_empty("AWS_SECRET_ACCESS_KEY") {
            self.s3.secret_access_key = Some(secret);
        }
        Ok(())
    }

    /// Location receiving the staging tables.
    #[must_use]
    pub fn output_path(&self) -> &str {
        self.storage
            .output_path
            .as_deref()
            .unwrap_or(&self.storage.base_path)
    }

    /// Local scratch directory.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.storage
            .work_dir
            .clone()
            .unwrap_or_else(paths::work_dir)
    }

    /// Backend used for `location`: the explicit backend when configured,
    /// otherwise inferred from the location itself.
    #[must_use]
    pub fn backend_for(&self, location: &str) -> Backend {
        self.storage
            .backend
            .unwrap_or_else(|| Backend::infer(location))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parses_full_config() {
        let config = StoreConfig::parse(
            r#"
            [storage]
            backend = "s3"
            base_path = "s3://crash-data/raw"
            output_path = "s3://crash-data/staging"

            [s3]
            endpoint = "https://example.com"
            access_key_id = "id"
            secret_access_key = "secret"

            [retry]
            max_attempts = 3
            base_delay_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, Some(Backend::S3));
        assert_eq!(config.output_path(), "s3://crash-data/staging");
        assert_eq!(config.s3.endpoint.as_deref(), Some("https://example.com"));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(50));
    }

    #[test]
    fn output_defaults_to_base_path() {
        let config = StoreConfig::parse("[storage]\nbase_path = \"/tmp/raw\"\n").unwrap();
        assert_eq!(config.output_path(), "/tmp/raw");
        assert_eq!(config.backend_for(config.output_path()), Backend::Local);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = StoreConfig::parse("[storage]\nbase_path = \"/tmp/raw\"\n").unwrap();
        config
            .apply_env(env(&[
                ("CRASH_ETL_BASE_PATH", "s3://bucket/raw"),
                ("AWS_ACCESS_KEY_ID", "abc"),
                ("AWS_REGION", ""),
            ]))
            .unwrap();
        assert_eq!(config.storage.base_path, "s3://bucket/raw");
        assert_eq!(config.backend_for(&config.storage.base_path), Backend::S3);
        assert_eq!(config.s3.access_key_id.as_deref(), Some("abc"));
        assert_eq!(config.s3.region, None);
    }

    #[test]
    fn rejects_unknown_backend() {
        let mut config = StoreConfig::default();
        let err = config
            .apply_env(env(&[("CRASH_ETL_BACKEND", "ftp")]))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig { .. }));
    }

    #[test]
    fn explicit_backend_wins_over_inference() {
        let mut config = StoreConfig::default();
        config
            .apply_env(env(&[("CRASH_ETL_BACKEND", "S3")]))
            .unwrap();
        assert_eq!(config.backend_for("/some/dir"), Backend::S3);
    }
}
