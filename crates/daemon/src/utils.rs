use std::{env, sync::Arc, time::Duration};

use air4thai_core::{
    find_config_file, load_config, open_store, ConfigError, ConfigSource, DatasetUri,
    IndexColumn, PartitionStore, S3Settings, DEFAULT_DATASET_URI, DEFAULT_FETCH_INTERVAL,
    DEFAULT_S3_ENDPOINT, DEFAULT_S3_REGION,
};
use clap::Parser;
use slog::{info, o, Drain, Level, Logger};

use crate::CoercionPolicy;

pub const DEFAULT_API_URL: &str = "http://air4thai.pcd.go.th/services/getNewAQI_JSON.php";

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "Air4Thai Daemon - Appends hourly PM2.5 snapshots to the lake"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $AIR4THAI_DAEMON_CONFIG, ./daemon.toml,
    /// $XDG_CONFIG_HOME/air4thai-lake/daemon.toml, /etc/air4thai-lake/daemon.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "AIR4THAI_DAEMON_LEVEL")]
    pub level: Option<String>,

    /// Air4Thai snapshot endpoint
    #[arg(short, long, env = "AIR4THAI_API_URL")]
    pub api_url: Option<String>,

    /// Dataset root, s3a://<repository>/<branch>/<dataset> or file://<dir>
    #[arg(short, long, env = "AIR4THAI_DATASET_URI")]
    pub dataset_uri: Option<String>,

    /// lakeFS S3 gateway endpoint
    #[arg(short, long, env = "LAKEFS_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, env = "LAKEFS_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    #[arg(long, env = "LAKEFS_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    #[arg(long, env = "AIR4THAI_S3_REGION")]
    pub region: Option<String>,

    /// PM2.5 reading stored as the index column: aqi or value
    #[arg(short, long, env = "AIR4THAI_INDEX_COLUMN")]
    pub index_column: Option<String>,

    /// Handling of non-numeric PM2.5 fields: fail-batch or skip-row
    #[arg(long, env = "AIR4THAI_COERCION_POLICY")]
    pub coercion_policy: Option<String>,

    /// Fetch interval in seconds (Air4Thai updates hourly)
    #[arg(short, long, env = "AIR4THAI_DAEMON_SLEEP_INTERVAL")]
    pub sleep_interval: Option<u64>,

    /// HTTP request timeout in seconds
    #[arg(short, long, env = "AIR4THAI_DAEMON_TIMEOUT")]
    pub timeout: Option<u64>,

    /// HTTP User-Agent header for Air4Thai requests
    #[arg(short, long, env = "AIR4THAI_DAEMON_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Run a single cycle and exit
    #[arg(long, default_value_t = false)]
    #[serde(default)]
    pub once: bool,
}

impl Cli {
    pub fn api_url(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn dataset_uri(&self) -> String {
        self.dataset_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_DATASET_URI.to_string())
    }

    pub fn dataset(&self) -> Result<DatasetUri, anyhow::Error> {
        Ok(DatasetUri::parse(&self.dataset_uri())?)
    }

    /// Gateway settings; only needed when the dataset lives behind S3
    pub fn s3_settings(&self) -> Result<S3Settings, ConfigError> {
        S3Settings::from_parts(
            Some(
                self.endpoint
                    .clone()
                    .unwrap_or_else(|| DEFAULT_S3_ENDPOINT.to_string()),
            ),
            self.access_key.clone(),
            self.secret_key.clone(),
            self.region
                .clone()
                .unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
        )
    }

    pub fn index_column(&self) -> Result<IndexColumn, ConfigError> {
        match &self.index_column {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                setting: "index_column",
                reason,
            }),
            None => Ok(IndexColumn::default()),
        }
    }

    pub fn coercion_policy(&self) -> Result<CoercionPolicy, ConfigError> {
        match &self.coercion_policy {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                setting: "coercion_policy",
                reason,
            }),
            None => Ok(CoercionPolicy::default()),
        }
    }

    pub fn sleep_interval(&self) -> u64 {
        self.sleep_interval.unwrap_or(DEFAULT_FETCH_INTERVAL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(30))
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("air4thai-daemon/{}", env!("CARGO_PKG_VERSION")))
    }

    /// Opens the store the dataset URI points at
    pub async fn open_dataset(
        &self,
        logger: &Logger,
    ) -> Result<Arc<dyn PartitionStore>, anyhow::Error> {
        let dataset = self.dataset()?;
        let settings = if dataset.is_remote() {
            let settings = self.s3_settings()?;
            info!(logger, "Using S3 endpoint: {}", settings.endpoint);
            Some(settings)
        } else {
            None
        };
        let store = open_store(&dataset, settings.as_ref()).await?;
        info!(logger, "Dataset storage initialized at {}", store.location(""));
        Ok(store)
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    merge_config(Cli::parse())
}

fn merge_config(cli_args: Cli) -> Cli {
    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("AIR4THAI_DAEMON_CONFIG", "daemon.toml")
    };

    let file_config: Cli = load_config(&source).unwrap_or_default();

    // CLI args override file config (env vars are handled by clap)
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        api_url: cli_args.api_url.or(file_config.api_url),
        dataset_uri: cli_args.dataset_uri.or(file_config.dataset_uri),
        endpoint: cli_args.endpoint.or(file_config.endpoint),
        access_key: cli_args.access_key.or(file_config.access_key),
        secret_key: cli_args.secret_key.or(file_config.secret_key),
        region: cli_args.region.or(file_config.region),
        index_column: cli_args.index_column.or(file_config.index_column),
        coercion_policy: cli_args.coercion_policy.or(file_config.coercion_policy),
        sleep_interval: cli_args.sleep_interval.or(file_config.sleep_interval),
        timeout: cli_args.timeout.or(file_config.timeout),
        user_agent: cli_args.user_agent.or(file_config.user_agent),
        once: cli_args.once || file_config.once,
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    }
}

pub fn setup_logger(cli: &Cli) -> Logger {
    let log_level = match cli.level.as_ref() {
        Some(level) => parse_level(level),
        None => parse_level(&env::var("RUST_LOG").unwrap_or_default()),
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(log_level).fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}
