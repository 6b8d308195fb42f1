//! Dataset addressing and the Hive-style partition layout
//!
//! A dataset root is addressed as `<scheme>://<repository>/<branch>/<dataset>`
//! (lakeFS S3 gateway) or `file://<path>` for a local directory. Below the
//! root, every file lives at `year=<Y>/month=<M>/day=<D>/hour=<H>/<file>`.

use std::fmt;
use std::path::PathBuf;

use glob::{MatchOptions, Pattern, PatternError};
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetUri {
    S3 {
        scheme: String,
        repository: String,
        branch: String,
        dataset: String,
    },
    Local {
        path: PathBuf,
    },
}

impl DatasetUri {
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| StorageError::InvalidUri(format!("{}: missing scheme", uri)))?;

        match scheme {
            "s3" | "s3a" => {
                let mut parts = rest.trim_matches('/').splitn(3, '/');
                let repository = parts.next().unwrap_or_default();
                let branch = parts.next().unwrap_or_default();
                let dataset = parts.next().unwrap_or_default();
                if repository.is_empty() || branch.is_empty() || dataset.is_empty() {
                    return Err(StorageError::InvalidUri(format!(
                        "{}: expected {}://<repository>/<branch>/<dataset>",
                        uri, scheme
                    )));
                }
                Ok(DatasetUri::S3 {
                    scheme: scheme.to_string(),
                    repository: repository.to_string(),
                    branch: branch.to_string(),
                    dataset: dataset.trim_end_matches('/').to_string(),
                })
            }
            "file" => {
                if rest.is_empty() {
                    return Err(StorageError::InvalidUri(format!("{}: empty path", uri)));
                }
                Ok(DatasetUri::Local {
                    path: PathBuf::from(rest),
                })
            }
            other => Err(StorageError::InvalidUri(format!(
                "{}: unsupported scheme `{}`",
                uri, other
            ))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, DatasetUri::S3 { .. })
    }
}

impl fmt::Display for DatasetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetUri::S3 {
                scheme,
                repository,
                branch,
                dataset,
            } => write!(f, "{}://{}/{}/{}", scheme, repository, branch, dataset),
            DatasetUri::Local { path } => write!(f, "file://{}", path.display()),
        }
    }
}

/// The (year, month, day, hour) cell a snapshot is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
}

impl PartitionKey {
    pub fn from_timestamp(timestamp: PrimitiveDateTime) -> Self {
        Self {
            year: timestamp.year(),
            month: u8::from(timestamp.month()),
            day: timestamp.day(),
            hour: timestamp.hour(),
        }
    }

    /// Relative directory of this cell, e.g. `year=2025/month=5/day=4/hour=14`
    pub fn path(&self) -> String {
        format!(
            "year={}/month={}/day={}/hour={}",
            self.year, self.month, self.day, self.hour
        )
    }

    /// Recovers the partition cell from a storage key by its `name=value` segments
    pub fn parse(key: &str) -> Option<Self> {
        let mut year = None;
        let mut month = None;
        let mut day = None;
        let mut hour = None;

        for segment in key.split('/') {
            let Some((name, value)) = segment.split_once('=') else {
                continue;
            };
            match name {
                "year" => year = value.parse::<i32>().ok(),
                "month" => month = value.parse::<u8>().ok(),
                "day" => day = value.parse::<u8>().ok(),
                "hour" => hour = value.parse::<u8>().ok(),
                _ => {}
            }
        }

        let key = PartitionKey {
            year: year?,
            month: month?,
            day: day?,
            hour: hour?,
        };
        key.start().map(|_| key)
    }

    /// First instant of the partition hour, `None` for an impossible calendar cell
    pub fn start(&self) -> Option<PrimitiveDateTime> {
        let month = Month::try_from(self.month).ok()?;
        let date = Date::from_calendar_date(self.year, month, self.day).ok()?;
        let time = Time::from_hms(self.hour, 0, 0).ok()?;
        Some(PrimitiveDateTime::new(date, time))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Prefix listing every partition file of a year
pub fn year_prefix(year: i32) -> String {
    format!("year={}/", year)
}

/// The four-level (month/day/hour/file) glob below a year
pub fn discovery_pattern(year: i32) -> Result<Pattern, PatternError> {
    Pattern::new(&format!("year={}/month=*/day=*/hour=*/*", year))
}

pub fn matches_discovery(pattern: &Pattern, key: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    pattern.matches_with(key, options)
}
