//! Column set shared by the partition writer and the consolidating reader
//!
//! The year/month/day/hour partition columns live in the directory path only;
//! inside a file the columns are the ones listed by [`create_reading_schema`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parquet::basic::{LogicalType, Repetition, Type as PhysicalType};
use parquet::errors::ParquetError;
use parquet::schema::types::Type;
use serde::Deserialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::PrimitiveDateTime;

use crate::PartitionKey;

pub const COL_TIMESTAMP: &str = "timestamp";
pub const COL_STATION_ID: &str = "stationID";
pub const COL_NAME_TH: &str = "nameTH";
pub const COL_NAME_EN: &str = "nameEN";
pub const COL_AREA_TH: &str = "areaTH";
pub const COL_AREA_EN: &str = "areaEN";
pub const COL_STATION_TYPE: &str = "stationType";
pub const COL_LAT: &str = "lat";
pub const COL_LONG: &str = "long";
pub const COL_PM25_COLOR_ID: &str = "PM25.color_id";
pub const COL_PM25_AQI: &str = "PM25.aqi";
pub const COL_PM25_VALUE: &str = "PM25.value";

/// Text encoding of `timestamp` inside partition files
pub const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Which PM2.5 reading the feed variant reports as the index value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexColumn {
    /// `AQILast.PM25.aqi`, an AQI integer
    #[default]
    Aqi,
    /// `AQILast.PM25.value`, a concentration in µg/m³
    Value,
}

impl IndexColumn {
    /// Key of the reading inside the nested `PM25` block
    pub fn source_field(&self) -> &'static str {
        match self {
            IndexColumn::Aqi => "aqi",
            IndexColumn::Value => "value",
        }
    }

    pub fn column_name(&self) -> &'static str {
        match self {
            IndexColumn::Aqi => COL_PM25_AQI,
            IndexColumn::Value => COL_PM25_VALUE,
        }
    }

    /// AQI is stored as INT64, the concentration as DOUBLE
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            IndexColumn::Aqi => PhysicalType::INT64,
            IndexColumn::Value => PhysicalType::DOUBLE,
        }
    }
}

impl fmt::Display for IndexColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_field())
    }
}

impl FromStr for IndexColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aqi" => Ok(IndexColumn::Aqi),
            "value" => Ok(IndexColumn::Value),
            other => Err(format!("unknown PM2.5 index column `{}`", other)),
        }
    }
}

/// One station's reading of one snapshot, flattened and typed
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub timestamp: PrimitiveDateTime,
    pub station_id: String,
    pub name_th: String,
    pub name_en: String,
    pub area_th: String,
    pub area_en: String,
    pub station_type: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pm25_color_id: i64,
    /// Whole number under [`IndexColumn::Aqi`]; negative means no reading
    pub pm25_index: f64,
}

impl NormalizedRow {
    // Partition columns are always derived from `timestamp`, there is no way to set them.
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::from_timestamp(self.timestamp)
    }

    pub fn year(&self) -> i32 {
        self.timestamp.year()
    }

    pub fn month(&self) -> u8 {
        u8::from(self.timestamp.month())
    }

    pub fn day(&self) -> u8 {
        self.timestamp.day()
    }

    pub fn hour(&self) -> u8 {
        self.timestamp.hour()
    }

    pub fn has_valid_index(&self) -> bool {
        self.pm25_index >= 0.0
    }
}

fn utf8_column(name: &str) -> Result<Type, ParquetError> {
    Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
        .with_repetition(Repetition::REQUIRED)
        .with_logical_type(Some(LogicalType::String))
        .build()
}

fn primitive_column(
    name: &str,
    physical: PhysicalType,
    repetition: Repetition,
) -> Result<Type, ParquetError> {
    Type::primitive_type_builder(name, physical)
        .with_repetition(repetition)
        .build()
}

/// Schema of one partition file; field order matches the writer's record struct
pub fn create_reading_schema(index: IndexColumn) -> Result<Type, ParquetError> {
    let fields = vec![
        Arc::new(utf8_column(COL_TIMESTAMP)?),
        Arc::new(utf8_column(COL_STATION_ID)?),
        Arc::new(utf8_column(COL_NAME_TH)?),
        Arc::new(utf8_column(COL_NAME_EN)?),
        Arc::new(utf8_column(COL_AREA_TH)?),
        Arc::new(utf8_column(COL_AREA_EN)?),
        Arc::new(utf8_column(COL_STATION_TYPE)?),
        Arc::new(primitive_column(
            COL_LAT,
            PhysicalType::DOUBLE,
            Repetition::OPTIONAL,
        )?),
        Arc::new(primitive_column(
            COL_LONG,
            PhysicalType::DOUBLE,
            Repetition::OPTIONAL,
        )?),
        Arc::new(primitive_column(
            COL_PM25_COLOR_ID,
            PhysicalType::INT64,
            Repetition::REQUIRED,
        )?),
        Arc::new(primitive_column(
            index.column_name(),
            index.physical_type(),
            Repetition::REQUIRED,
        )?),
    ];

    Type::group_type_builder("airquality")
        .with_fields(fields)
        .build()
}
