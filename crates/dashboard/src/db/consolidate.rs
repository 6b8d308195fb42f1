use std::sync::Arc;

use air4thai_core::{
    discovery_pattern, matches_discovery, year_prefix, PartitionKey, PartitionStore,
    StorageError,
};
use bytes::Bytes;
use log::{debug, info, warn};
use parquet::errors::ParquetError;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde::{Serialize, Serializer};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::db::repair::{deduplicate, forward_fill_index};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to access partitions: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid discovery pattern: {0}")]
    Pattern(String),
}

const TIMESTAMP_FORMATS: [&[FormatItem<'static>]; 4] = [
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
];

const CSV_TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

fn serialize_timestamp<S: Serializer>(
    timestamp: &PrimitiveDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let text = timestamp
        .format(CSV_TIMESTAMP_FORMAT)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&text)
}

/// One row of the consolidated table. Column names follow the partition files,
/// with the partition columns recovered from the path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: PrimitiveDateTime,
    #[serde(rename = "stationID")]
    pub station_id: String,
    #[serde(rename = "nameTH")]
    pub name_th: String,
    #[serde(rename = "nameEN")]
    pub name_en: String,
    #[serde(rename = "areaTH")]
    pub area_th: String,
    #[serde(rename = "areaEN")]
    pub area_en: String,
    #[serde(rename = "stationType")]
    pub station_type: String,
    #[serde(rename = "lat")]
    pub latitude: Option<f64>,
    #[serde(rename = "long")]
    pub longitude: Option<f64>,
    #[serde(rename = "PM25.color_id")]
    pub pm25_color_id: Option<i64>,
    #[serde(rename = "PM25.aqi")]
    pub pm25_index: Option<f64>,
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedDataset {
    pub year: i32,
    /// Partition files that contributed rows
    pub files: usize,
    /// Partition files that could not be decoded
    pub skipped_files: Vec<String>,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Consolidation {
    /// No partition file exists for the year
    NoData { year: i32 },
    Ready(ConsolidatedDataset),
}

/// Loads every partition of a year into one repaired table
pub struct Consolidator {
    store: Arc<dyn PartitionStore>,
}

impl Consolidator {
    pub fn new(store: Arc<dyn PartitionStore>) -> Self {
        Self { store }
    }

    /// Partition files under `year=<Y>/month=*/day=*/hour=*/*`
    pub async fn discover(&self, year: i32) -> Result<Vec<String>, Error> {
        let pattern = discovery_pattern(year).map_err(|e| Error::Pattern(e.to_string()))?;
        let keys = self.store.list(&year_prefix(year)).await?;
        let files: Vec<String> = keys
            .into_iter()
            .filter(|key| matches_discovery(&pattern, key))
            .collect();
        debug!("discovered {} partition files for {}", files.len(), year);
        Ok(files)
    }

    pub async fn load(&self, year: i32) -> Result<Consolidation, Error> {
        let files = self.discover(year).await?;
        if files.is_empty() {
            info!("no partitions found for year {}", year);
            return Ok(Consolidation::NoData { year });
        }

        let mut readings = vec![];
        let mut skipped_files = vec![];
        let mut decoded = 0;
        for key in &files {
            let Some(partition) = PartitionKey::parse(key) else {
                warn!("skipping {}: not a valid partition path", key);
                skipped_files.push(key.clone());
                continue;
            };

            let body = self.store.get(key).await?;
            match decode_partition(partition, body) {
                Ok(rows) => {
                    decoded += 1;
                    readings.extend(rows);
                }
                Err(e) => {
                    warn!("skipping {}: {}", self.store.location(key), e);
                    skipped_files.push(key.clone());
                }
            }
        }

        let merged = readings.len();
        let mut readings = deduplicate(readings);
        forward_fill_index(&mut readings);
        info!(
            "consolidated {} rows ({} duplicates dropped) from {} files for {}",
            readings.len(),
            merged - readings.len(),
            decoded,
            year
        );

        Ok(Consolidation::Ready(ConsolidatedDataset {
            year,
            files: decoded,
            skipped_files,
            readings,
        }))
    }
}

/// Decodes one partition file; columns are matched by name, so files written with
/// either index variant (or extra columns) are accepted.
pub fn decode_partition(partition: PartitionKey, body: Bytes) -> Result<Vec<Reading>, ParquetError> {
    let reader = SerializedFileReader::new(body)?;
    let mut readings = vec![];

    for row in reader.get_row_iter(None)? {
        let row = row?;
        let mut reading = Reading {
            timestamp: partition_start(&partition),
            station_id: String::new(),
            name_th: String::new(),
            name_en: String::new(),
            area_th: String::new(),
            area_en: String::new(),
            station_type: String::new(),
            latitude: None,
            longitude: None,
            pm25_color_id: None,
            pm25_index: None,
            year: partition.year,
            month: partition.month,
            day: partition.day,
            hour: partition.hour,
        };
        let mut value_fallback = None;

        for (name, field) in row.get_column_iter() {
            match name.as_str() {
                "timestamp" => {
                    if let Some(timestamp) = field_timestamp(field) {
                        reading.timestamp = timestamp;
                    }
                }
                "stationID" => reading.station_id = field_text(field).unwrap_or_default(),
                "nameTH" => reading.name_th = field_text(field).unwrap_or_default(),
                "nameEN" => reading.name_en = field_text(field).unwrap_or_default(),
                "areaTH" => reading.area_th = field_text(field).unwrap_or_default(),
                "areaEN" => reading.area_en = field_text(field).unwrap_or_default(),
                "stationType" => reading.station_type = field_text(field).unwrap_or_default(),
                "lat" => reading.latitude = field_number(field),
                "long" => reading.longitude = field_number(field),
                "PM25.color_id" => reading.pm25_color_id = field_integer(field),
                "PM25.aqi" => reading.pm25_index = field_number(field),
                "PM25.value" => value_fallback = field_number(field),
                _ => {}
            }
        }

        if reading.pm25_index.is_none() {
            reading.pm25_index = value_fallback;
        }
        readings.push(reading);
    }

    Ok(readings)
}

fn partition_start(partition: &PartitionKey) -> PrimitiveDateTime {
    // `PartitionKey::parse` only yields keys with a valid start
    partition
        .start()
        .unwrap_or(PrimitiveDateTime::MIN)
}

pub fn field_text(field: &Field) -> Option<String> {
    match field {
        Field::Str(value) => Some(value.clone()),
        Field::Null => None,
        Field::Bool(value) => Some(value.to_string()),
        Field::Int(value) => Some(value.to_string()),
        Field::Long(value) => Some(value.to_string()),
        Field::Float(value) => Some(value.to_string()),
        Field::Double(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Numeric value of a cell; unparsable text and non-finite numbers become missing
pub fn field_number(field: &Field) -> Option<f64> {
    let value = match field {
        Field::Double(value) => *value,
        Field::Float(value) => f64::from(*value),
        Field::Int(value) => f64::from(*value),
        Field::Long(value) => *value as f64,
        Field::Short(value) => f64::from(*value),
        Field::Byte(value) => f64::from(*value),
        Field::Str(value) => value.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

pub fn field_integer(field: &Field) -> Option<i64> {
    match field {
        Field::Long(value) => Some(*value),
        Field::Int(value) => Some(i64::from(*value)),
        Field::Short(value) => Some(i64::from(*value)),
        Field::Byte(value) => Some(i64::from(*value)),
        other => {
            let value = field_number(other)?;
            (value.fract() == 0.0).then_some(value as i64)
        }
    }
}

pub fn field_timestamp(field: &Field) -> Option<PrimitiveDateTime> {
    match field {
        Field::Str(value) => parse_timestamp_text(value),
        Field::TimestampMillis(millis) => from_unix_nanos(i128::from(*millis) * 1_000_000),
        Field::TimestampMicros(micros) => from_unix_nanos(i128::from(*micros) * 1_000),
        _ => None,
    }
}

pub fn parse_timestamp_text(value: &str) -> Option<PrimitiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(value, format).ok())
}

fn from_unix_nanos(nanos: i128) -> Option<PrimitiveDateTime> {
    let utc = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
    Some(PrimitiveDateTime::new(utc.date(), utc.time()))
}
