//! S3/MinIO client implementation.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Object store configuration.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// S3 API endpoint (MinIO or AWS)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
    /// Bucket name
    pub bucket: String,
    /// Region
    pub region: String,
    /// Path-style addressing (required for MinIO)
    pub force_path_style: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "transcode".to_string(),
            region: "us-east-1".to_string(),
            force_path_style: true,
        }
    }
}

impl ObjectStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint_url: std::env::var("S3_ENDPOINT").unwrap_or(defaults.endpoint_url),
            access_key: std::env::var("S3_ACCESS_KEY").unwrap_or(defaults.access_key),
            secret_key: std::env::var("S3_SECRET_KEY").unwrap_or(defaults.secret_key),
            bucket: std::env::var("S3_BUCKET").unwrap_or(defaults.bucket),
            region: std::env::var("S3_REGION").unwrap_or(defaults.region),
            force_path_style: std::env::var("S3_USE_PATH_STYLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

/// Object store client for source media and rendition outputs.
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    /// Create a new client from configuration.
    pub fn new(config: ObjectStoreConfig) -> Self {
        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "static");

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style)
            .build();

        info!(bucket = %config.bucket, "Connected to object store");

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(ObjectStoreConfig::from_env())
    }

    /// Download an object to a local path, streaming chunk by chunk.
    pub async fn download(&self, key: &str, dest: impl AsRef<Path>) -> StorageResult<()> {
        let dest = dest.as_ref();
        debug!(key, dest = %dest.display(), "Downloading object");

        let mut response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(format!("{key}: {message}"))
                }
            })?;

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response
            .body
            .try_next()
            .await
            .map_err(|e| StorageError::download_failed(format!("{key}: {e}")))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }

    /// Upload a local file to the given key.
    ///
    /// Last-writer-wins at the key; re-running a job overwrites the same
    /// locator with equivalent content.
    pub async fn upload(&self, src: impl AsRef<Path>, key: &str) -> StorageResult<()> {
        let src = src.as_ref();
        debug!(key, src = %src.display(), "Uploading object");

        let body = ByteStream::from_path(src)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {e}", src.display())))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{key}: {e}")))?;

        Ok(())
    }

    /// Check whether an object exists at the given key.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        Ok(result.is_ok())
    }

    /// Create the bucket if it does not exist yet. Used by local setups
    /// against MinIO; AWS buckets are provisioned out of band.
    pub async fn ensure_bucket(&self) -> StorageResult<()> {
        let exists = self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok();

        if !exists {
            info!(bucket = %self.bucket, "Creating bucket");
            self.client
                .create_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map_err(|e| StorageError::config_error(format!("create bucket: {e}")))?;
        }

        Ok(())
    }
}
