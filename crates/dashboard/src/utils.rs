use std::{env, time::Duration};

use air4thai_core::{
    find_config_file, load_config, ConfigError, ConfigSource, DatasetUri, S3Settings,
    DEFAULT_DASHBOARD_PORT, DEFAULT_DATASET_URI, DEFAULT_S3_ENDPOINT, DEFAULT_S3_REGION,
};
use clap::Parser;
use fern::{
    colors::{Color, ColoredLevelConfig},
    Dispatch,
};
use log::LevelFilter;
use time::{format_description::well_known::Iso8601, OffsetDateTime};

use crate::{DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};

/// Seconds a consolidated year stays cached
pub const DEFAULT_CACHE_TTL: u64 = 600;

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "Air4Thai Dashboard - Serves the consolidated air quality table"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $AIR4THAI_DASHBOARD_CONFIG, ./dashboard.toml,
    /// $XDG_CONFIG_HOME/air4thai-lake/dashboard.toml, /etc/air4thai-lake/dashboard.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "AIR4THAI_DASHBOARD_LEVEL")]
    pub level: Option<String>,

    /// Host to listen on (use 0.0.0.0 for all interfaces)
    #[arg(long, env = "AIR4THAI_DASHBOARD_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "AIR4THAI_DASHBOARD_PORT")]
    pub port: Option<u16>,

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

    /// Partition year to load, defaults to the current UTC year
    #[arg(short, long, env = "AIR4THAI_DASHBOARD_YEAR")]
    pub year: Option<i32>,

    /// Seconds the consolidated table is kept in memory
    #[arg(long, env = "AIR4THAI_DASHBOARD_CACHE_TTL")]
    pub cache_ttl: Option<u64>,

    /// OpenAI-compatible API used for insights
    #[arg(long, env = "AIR4THAI_LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    #[arg(long, env = "AIR4THAI_LLM_MODEL")]
    pub llm_model: Option<String>,

    /// Insights are disabled without a key
    #[arg(long, env = "TYPHOON_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,
}

impl Cli {
    pub fn host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_DASHBOARD_PORT)
    }

    pub fn dataset_uri(&self) -> String {
        self.dataset_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_DATASET_URI.to_string())
    }

    pub fn dataset(&self) -> Result<DatasetUri, anyhow::Error> {
        Ok(DatasetUri::parse(&self.dataset_uri())?)
    }

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

    pub fn year(&self) -> i32 {
        self.year
            .unwrap_or_else(|| OffsetDateTime::now_utc().year())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL))
    }

    pub fn llm_base_url(&self) -> String {
        self.llm_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string())
    }

    pub fn llm_model(&self) -> String {
        self.llm_model
            .clone()
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string())
    }

    pub fn llm_api_key(&self) -> Option<String> {
        self.llm_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
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
        find_config_file("AIR4THAI_DASHBOARD_CONFIG", "dashboard.toml")
    };

    if let Some(path) = source.path() {
        log::info!("Loading config from: {}", path.display());
    }

    let file_config: Cli = load_config(&source).unwrap_or_default();

    // CLI args override file config (env vars are handled by clap)
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        host: cli_args.host.or(file_config.host),
        port: cli_args.port.or(file_config.port),
        dataset_uri: cli_args.dataset_uri.or(file_config.dataset_uri),
        endpoint: cli_args.endpoint.or(file_config.endpoint),
        access_key: cli_args.access_key.or(file_config.access_key),
        secret_key: cli_args.secret_key.or(file_config.secret_key),
        region: cli_args.region.or(file_config.region),
        year: cli_args.year.or(file_config.year),
        cache_ttl: cli_args.cache_ttl.or(file_config.cache_ttl),
        llm_base_url: cli_args.llm_base_url.or(file_config.llm_base_url),
        llm_model: cli_args.llm_model.or(file_config.llm_model),
        llm_api_key: cli_args.llm_api_key.or(file_config.llm_api_key),
    }
}

pub fn get_log_level(cli: &Cli) -> LevelFilter {
    let level_str = cli
        .level
        .clone()
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());

    match level_str.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

pub fn setup_logger() -> Dispatch {
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let now = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                now,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .chain(std::io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_any_setting() {
        let cli = Cli::default();
        assert_eq!(cli.port(), 8501);
        assert_eq!(cli.host(), "127.0.0.1");
        assert_eq!(cli.cache_ttl(), Duration::from_secs(600));
        assert_eq!(cli.llm_model(), "typhoon-v2-70b-instruct");
        assert_eq!(cli.llm_api_key(), None);
        assert_eq!(cli.year(), OffsetDateTime::now_utc().year());
    }

    #[test]
    fn remote_dataset_needs_credentials() {
        let cli = Cli::default();
        assert!(cli.dataset().unwrap().is_remote());
        assert_eq!(
            cli.s3_settings().unwrap_err(),
            ConfigError::Missing {
                setting: "access_key",
                env_var: "LAKEFS_ACCESS_KEY"
            }
        );
    }

    #[test]
    fn blank_api_key_disables_insights() {
        let cli = Cli {
            llm_api_key: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(cli.llm_api_key(), None);
    }

    #[test]
    fn config_file_fills_unset_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9000\nyear = 2024\nlevel = \"debug\"").unwrap();

        let merged = merge_config(Cli {
            config: Some(file.path().display().to_string()),
            level: Some("warn".into()),
            ..Default::default()
        });
        assert_eq!(merged.port(), 9000);
        assert_eq!(merged.year(), 2024);
        assert_eq!(get_log_level(&merged), LevelFilter::Warn);
    }
}
