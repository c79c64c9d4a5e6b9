//! S3-compatible object store.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;

use crate::config::S3Section;
use crate::{StorageError, StorageOperation, Store, join_key};

/// A [`Store`] over one bucket and key prefix.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

/// Splits `s3://bucket/prefix` into bucket and prefix.
///
/// # Errors
///
/// Returns [`StorageError::InvalidConfig`] if `location` is not an `s3://`
/// URI with a bucket.
pub fn parse_location(location: &str) -> Result<(String, String), StorageError> {
    let rest = location
        .strip_prefix("s3://")
        .ok_or_else(|| StorageError::InvalidConfig {
            message: format!("{location:?} is not an s3:// location"),
        })?;
    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(StorageError::InvalidConfig {
            message: format!("{location:?} has no bucket"),
        });
    }
    Ok((bucket.to_string(), prefix.trim_matches('/').to_string()))
}

impl S3Store {
    /// Builds a client for `location` from the `[s3]` config section.
    ///
    /// With static credentials configured (e.g. for an S3-compatible
    /// endpoint) those are used directly; otherwise the default AWS
    /// provider chain is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if `location` is malformed or
    /// only one half of the static credentials is configured.
    pub async fn connect(section: &S3Section, location: &str) -> Result<Self, StorageError> {
        let (bucket, prefix) = parse_location(location)?;

        let config = match (&section.access_key_id, &section.secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                let creds = Credentials::new(access_key, secret_key, None, None, "crash-etl-config");
                let mut builder = aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(
                        section.region.clone().unwrap_or_else(|| "auto".to_string()),
                    ))
                    .credentials_provider(creds)
                    .force_path_style(true);
                if let Some(endpoint) = &section.endpoint {
                    builder = builder.endpoint_url(endpoint);
                }
                builder.build()
            }
            (None, None) => {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &section.region {
                    loader = loader.region(Region::new(region.clone()));
                }
                let shared = loader.load().await;
                let mut builder = aws_sdk_s3::config::Builder::from(&shared);
                if let Some(endpoint) = &section.endpoint {
                    builder = builder.endpoint_url(endpoint).force_path_style(true);
                }
                builder.build()
            }
            (Some(_), None) => {
                return Err(StorageError::MissingConfig {
                    name: "AWS_SECRET_ACCESS_KEY".to_string(),
                });
            }
            (None, Some(_)) => {
                return Err(StorageError::MissingConfig {
                    name: "AWS_ACCESS_KEY_ID".to_string(),
                });
            }
        };

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket,
            prefix,
        })
    }

    fn key(&self, key: &str) -> String {
        join_key(&self.prefix, key)
    }

    fn backend_error<E>(
        &self,
        key: &str,
        operation: StorageOperation,
        e: SdkError<E, HttpResponse>,
    ) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StorageError::Backend {
            path: self.location(key),
            operation,
            transient: is_transient(&e),
            source: Box::new(e),
        }
    }
}

/// Timeouts, dispatch failures, throttling and server errors are worth
/// retrying; client errors are not.
fn is_transient<E>(e: &SdkError<E, HttpResponse>) -> bool {
    match e {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            status == 429 || status >= 500
        }
        _ => false,
    }
}

#[async_trait]
impl Store for S3Store {
    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.key(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        log::debug!("Downloading {}", self.location(key));
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(key))
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(StorageError::NotFound {
                    path: self.location(key),
                    operation: StorageOperation::Get,
                });
            }
            Err(e) => return Err(self.backend_error(key, StorageOperation::Get, e)),
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend {
                path: self.location(key),
                operation: StorageOperation::Get,
                transient: true,
                source: Box::new(e),
            })?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        #[allow(clippy::cast_precision_loss)] // display-only MB value
        let mb = data.len() as f64 / 1_048_576.0;
        log::info!("Uploading {} ({mb:.1} MB)", self.location(key));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(key))
            .body(ByteStream::from(data))
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(|e| self.backend_error(key, StorageOperation::Put, e))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let full_prefix = self.key(prefix);
        log::debug!("Listing s3://{}/{full_prefix}*", self.bucket);

        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| self.backend_error(prefix, StorageOperation::List, e))?;

            for obj in output.contents() {
                if let Some(key) = obj.key() {
                    let relative = if self.prefix.is_empty() {
                        key
                    } else {
                        key.strip_prefix(&self.prefix)
                            .map_or(key, |k| k.trim_start_matches('/'))
                    };
                    keys.push(relative.to_string());
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        keys.sort();
        log::debug!("  found {} objects", keys.len());
        Ok(keys)
    }
}
