//! Air4Thai Lake Core Library
//!
//! Shared pieces of the ingest daemon and the dashboard:
//! - Configuration loading (XDG-compliant)
//! - Dataset URI and Hive-style partition layout
//! - Row schema of the partition files
//! - Partition storage (local filesystem or S3-compatible gateway)

mod config;
pub mod partition;
pub mod schema;
pub mod storage;

pub use config::{find_config_file, load_config, require_setting, ConfigError, ConfigSource};
pub use partition::{discovery_pattern, matches_discovery, year_prefix, DatasetUri, PartitionKey};
pub use schema::{create_reading_schema, IndexColumn, NormalizedRow, TIMESTAMP_FORMAT};
pub use storage::{open_store, LocalStore, PartitionStore, S3Settings, S3Store, StorageError};

/// Application name used for XDG paths
pub const APP_NAME: &str = "air4thai-lake";

/// Default dashboard port
pub const DEFAULT_DASHBOARD_PORT: u16 = 8501;

/// Default daemon fetch interval (1 hour)
pub const DEFAULT_FETCH_INTERVAL: u64 = 3600;

/// Dataset root written by the daemon and read by the dashboard
pub const DEFAULT_DATASET_URI: &str = "s3a://air-quality/main/airquality.parquet";

/// lakeFS S3 gateway of the docker-compose deployment
pub const DEFAULT_S3_ENDPOINT: &str = "http://lakefs-dev:8000";

/// lakeFS ignores the region but the SDK insists on one
pub const DEFAULT_S3_REGION: &str = "us-east-1";
