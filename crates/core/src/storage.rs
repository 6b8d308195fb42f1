//! Partition file storage
//!
//! Keys are relative to the dataset root and always use `/` separators, e.g.
//! `year=2025/month=5/day=4/hour=14/0196a1c4-....parquet`.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use walkdir::WalkDir;

use crate::{require_setting, ConfigError, DatasetUri};

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("S3 request failed: {0}")]
    S3(String),
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    #[error("Invalid dataset uri: {0}")]
    InvalidUri(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Append-only object storage holding the partition files of one dataset
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Stores a whole object; readers never observe a partially written one
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;
    /// Every key starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;
    /// Human readable address of a key, for logs
    fn location(&self, key: &str) -> String;
}

/// Connection settings of the S3-compatible (lakeFS) gateway
#[derive(Clone, PartialEq)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl S3Settings {
    /// Builds the settings, failing on the first absent credential
    pub fn from_parts(
        endpoint: Option<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
        region: String,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: require_setting(endpoint, "endpoint", "LAKEFS_ENDPOINT")?,
            access_key: require_setting(access_key, "access_key", "LAKEFS_ACCESS_KEY")?,
            secret_key: require_setting(secret_key, "secret_key", "LAKEFS_SECRET_KEY")?,
            region,
        })
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Opens the store a dataset URI points at
pub async fn open_store(
    uri: &DatasetUri,
    settings: Option<&S3Settings>,
) -> Result<Arc<dyn PartitionStore>, StorageError> {
    match uri {
        DatasetUri::Local { path } => Ok(Arc::new(LocalStore::new(path.clone()))),
        DatasetUri::S3 {
            repository,
            branch,
            dataset,
            ..
        } => {
            let settings = settings.ok_or(ConfigError::Missing {
                setting: "endpoint",
                env_var: "LAKEFS_ENDPOINT",
            })?;
            let store =
                S3Store::connect(settings, repository.clone(), format!("{}/{}", branch, dataset))
                    .await;
            Ok(Arc::new(store))
        }
    }
}

/// Keys must stay below the root: only plain path components are accepted
fn key_is_valid(key: &str) -> bool {
    let path = Path::new(key);
    let mut components = path.components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}

/// Dataset stored in a local directory, used for development and tests
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        if !key_is_valid(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl PartitionStore for LocalStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;

        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;

        // dot-prefixed files never match the discovery glob
        let partial = parent.join(format!(".{}.partial", file_name));
        tokio::fs::write(&partial, body)
            .await
            .map_err(|e| io_error(&partial, e))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        if !self.root.exists() {
            return Ok(vec![]);
        }

        let mut keys = vec![];
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| io_error(&self.root, e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.resolve(key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        Ok(Bytes::from(data))
    }

    fn location(&self, key: &str) -> String {
        format!("file://{}/{}", self.root.display(), key)
    }
}

/// Dataset stored behind an S3-compatible gateway.
/// lakeFS maps the bucket to a repository and the first key segment to a branch.
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Store {
    pub async fn connect(settings: &S3Settings, bucket: String, prefix: String) -> Self {
        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "air4thai-static",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(settings.endpoint.clone())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        Self::from_client(Client::from_conf(s3_config), bucket, prefix)
    }

    pub fn from_client(client: Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn object_key(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }
}

#[async_trait]
impl PartitionStore for S3Store {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        if !key_is_valid(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let object_key = self.object_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(body))
            .content_type("application/parquet")
            .send()
            .await
            .map_err(|e| {
                StorageError::S3(format!(
                    "put_object '{}': {}",
                    object_key,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let full_prefix = self.object_key(prefix);
        let root = format!("{}/", self.prefix);
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);
            if let Some(token) = &continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req.send().await.map_err(|e| {
                StorageError::S3(format!(
                    "list_objects_v2 '{}': {}",
                    full_prefix,
                    DisplayErrorContext(&e)
                ))
            })?;

            for obj in resp.contents() {
                if let Some(relative) = obj.key().and_then(|k| k.strip_prefix(&root)) {
                    keys.push(relative.to_string());
                }
            }

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(|s| s.to_string());
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let object_key = self.object_key(key);
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|e| {
                StorageError::S3(format!(
                    "get_object '{}': {}",
                    object_key,
                    DisplayErrorContext(&e)
                ))
            })?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(format!("read body '{}': {}", object_key, e)))?;
        Ok(body.into_bytes())
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.object_key(key))
    }
}
