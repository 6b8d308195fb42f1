use std::collections::BTreeMap;
use std::str::FromStr;

use air4thai_core::{IndexColumn, NormalizedRow};
use serde::Deserialize;
use serde_json::Value;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

use crate::IngestError;

/*
Air4Thai getNewAQI_JSON.php, one entry of `stations`:

{
  "stationID": "02t", "nameTH": "...", "nameEN": "...", "areaTH": "...", "areaEN": "...",
  "stationType": "GROUND", "lat": "13.732846", "long": "100.487662",
  "AQILast": {
    "date": "2025-05-04", "time": "14:00",
    "PM25": { "color_id": "2", "aqi": "41", "value": "24.3" },
    ...
  }
}
*/

/// Nested JSON path of a field and the flat column it lands in
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub path: &'static [&'static str],
    pub column: &'static str,
}

impl FieldMapping {
    pub fn key(&self) -> String {
        self.path.join(".")
    }
}

pub const STATION_ID: FieldMapping = FieldMapping {
    path: &["stationID"],
    column: "stationID",
};
pub const NAME_TH: FieldMapping = FieldMapping {
    path: &["nameTH"],
    column: "nameTH",
};
pub const NAME_EN: FieldMapping = FieldMapping {
    path: &["nameEN"],
    column: "nameEN",
};
pub const AREA_TH: FieldMapping = FieldMapping {
    path: &["areaTH"],
    column: "areaTH",
};
pub const AREA_EN: FieldMapping = FieldMapping {
    path: &["areaEN"],
    column: "areaEN",
};
pub const STATION_TYPE: FieldMapping = FieldMapping {
    path: &["stationType"],
    column: "stationType",
};
pub const LAT: FieldMapping = FieldMapping {
    path: &["lat"],
    column: "lat",
};
pub const LONG: FieldMapping = FieldMapping {
    path: &["long"],
    column: "long",
};
pub const DATE: FieldMapping = FieldMapping {
    path: &["AQILast", "date"],
    column: "date",
};
pub const TIME: FieldMapping = FieldMapping {
    path: &["AQILast", "time"],
    column: "time",
};
pub const PM25_COLOR_ID: FieldMapping = FieldMapping {
    path: &["AQILast", "PM25", "color_id"],
    column: "PM25.color_id",
};
pub const PM25_AQI: FieldMapping = FieldMapping {
    path: &["AQILast", "PM25", "aqi"],
    column: "PM25.aqi",
};
pub const PM25_VALUE: FieldMapping = FieldMapping {
    path: &["AQILast", "PM25", "value"],
    column: "PM25.value",
};

/// Full mapping table for one feed variant
pub fn field_mappings(index: IndexColumn) -> [FieldMapping; 12] {
    let index_field = match index {
        IndexColumn::Aqi => PM25_AQI,
        IndexColumn::Value => PM25_VALUE,
    };
    [
        STATION_ID,
        NAME_TH,
        NAME_EN,
        AREA_TH,
        AREA_EN,
        STATION_TYPE,
        LAT,
        LONG,
        DATE,
        TIME,
        PM25_COLOR_ID,
        index_field,
    ]
}

/// What to do with a row whose PM2.5 fields are not numeric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoercionPolicy {
    /// The whole snapshot is rejected
    #[default]
    FailBatch,
    /// The row is dropped and reported in [`Snapshot::skipped`]
    SkipRow,
}

impl FromStr for CoercionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail-batch" => Ok(CoercionPolicy::FailBatch),
            "skip-row" => Ok(CoercionPolicy::SkipRow),
            other => Err(format!("unknown coercion policy `{}`", other)),
        }
    }
}

/// One station record flattened to dotted column names; `None` is a JSON null
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRecord {
    values: BTreeMap<&'static str, Option<String>>,
    context: String,
}

impl FlatRecord {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }

    fn text(&self, mapping: &FieldMapping) -> String {
        self.get(mapping.column).unwrap_or_default().to_string()
    }

    fn required(&self, mapping: &FieldMapping) -> Result<&str, IngestError> {
        self.get(mapping.column)
            .ok_or_else(|| IngestError::MissingField {
                key: mapping.key(),
                context: self.context.clone(),
            })
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Applies the mapping table to one raw record; every path has to exist
pub fn flatten_record(
    record: &Value,
    position: usize,
    mappings: &[FieldMapping],
) -> Result<FlatRecord, IngestError> {
    let context = match record.get("stationID").and_then(scalar_text) {
        Some(id) => format!("station {}", id),
        None => format!("record {}", position),
    };

    let mut values = BTreeMap::new();
    for mapping in mappings {
        let mut current = record;
        for segment in mapping.path {
            current = current
                .get(segment)
                .ok_or_else(|| IngestError::MissingField {
                    key: mapping.key(),
                    context: context.clone(),
                })?;
        }
        values.insert(mapping.column, scalar_text(current));
    }

    Ok(FlatRecord { values, context })
}

/// Most frequent value; ties go to the smallest value so the choice is stable
pub fn mode<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

pub fn parse_timestamp(date: &str, time: &str) -> Option<PrimitiveDateTime> {
    let date = Date::parse(date.trim(), format_description!("[year]-[month]-[day]")).ok()?;
    let time = time.trim();
    let time = Time::parse(time, format_description!("[hour]:[minute]:[second]"))
        .or_else(|_| Time::parse(time, format_description!("[hour]:[minute]")))
        .ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

pub fn coerce_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}

pub fn coerce_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Normalized rows of one fetch cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: PrimitiveDateTime,
    pub rows: Vec<NormalizedRow>,
    /// Rows dropped under [`CoercionPolicy::SkipRow`]
    pub skipped: Vec<String>,
}

/// Reshapes a raw `stations` array into flat typed rows
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    index: IndexColumn,
    policy: CoercionPolicy,
}

impl Normalizer {
    pub fn new(index: IndexColumn, policy: CoercionPolicy) -> Self {
        Self { index, policy }
    }

    pub fn index_column(&self) -> IndexColumn {
        self.index
    }

    pub fn normalize(&self, stations: &[Value]) -> Result<Snapshot, IngestError> {
        if stations.is_empty() {
            return Err(IngestError::EmptyBatch);
        }

        let mappings = field_mappings(self.index);
        let records = stations
            .iter()
            .enumerate()
            .map(|(position, record)| flatten_record(record, position, &mappings))
            .collect::<Result<Vec<_>, _>>()?;

        let timestamp = self.snapshot_timestamp(&records)?;
        let index_field = mappings[mappings.len() - 1];

        let mut rows = Vec::with_capacity(records.len());
        let mut skipped = vec![];
        for record in &records {
            match self.build_row(record, timestamp, &index_field) {
                Ok(row) => rows.push(row),
                Err(err @ IngestError::TypeCoercion { .. })
                    if self.policy == CoercionPolicy::SkipRow =>
                {
                    skipped.push(err.to_string())
                }
                Err(err) => return Err(err),
            }
        }

        if rows.is_empty() {
            return Err(IngestError::EmptyBatch);
        }

        Ok(Snapshot {
            timestamp,
            rows,
            skipped,
        })
    }

    // date and time take their mode independently, so a majority date can pair
    // with a time reported by other stations
    fn snapshot_timestamp(&self, records: &[FlatRecord]) -> Result<PrimitiveDateTime, IngestError> {
        let dates = records
            .iter()
            .map(|r| r.required(&DATE))
            .collect::<Result<Vec<_>, _>>()?;
        let times = records
            .iter()
            .map(|r| r.required(&TIME))
            .collect::<Result<Vec<_>, _>>()?;

        let date = mode(dates).ok_or(IngestError::EmptyBatch)?;
        let time = mode(times).ok_or(IngestError::EmptyBatch)?;

        parse_timestamp(date, time).ok_or_else(|| IngestError::TypeCoercion {
            column: String::from("timestamp"),
            value: format!("{} {}", date, time),
            context: String::from("snapshot"),
        })
    }

    fn build_row(
        &self,
        record: &FlatRecord,
        timestamp: PrimitiveDateTime,
        index_field: &FieldMapping,
    ) -> Result<NormalizedRow, IngestError> {
        let coercion_error = |mapping: &FieldMapping, value: Option<&str>| {
            IngestError::TypeCoercion {
                column: mapping.column.to_string(),
                value: value.unwrap_or("null").to_string(),
                context: record.context.clone(),
            }
        };

        let raw_color = record.get(PM25_COLOR_ID.column);
        let pm25_color_id = raw_color
            .and_then(coerce_integer)
            .ok_or_else(|| coercion_error(&PM25_COLOR_ID, raw_color))?;

        let raw_index = record.get(index_field.column);
        let pm25_index = raw_index
            .and_then(|raw| match self.index {
                IndexColumn::Aqi => coerce_integer(raw).map(|aqi| aqi as f64),
                IndexColumn::Value => coerce_float(raw),
            })
            .ok_or_else(|| coercion_error(index_field, raw_index))?;

        Ok(NormalizedRow {
            timestamp,
            station_id: record.text(&STATION_ID),
            name_th: record.text(&NAME_TH),
            name_en: record.text(&NAME_EN),
            area_th: record.text(&AREA_TH),
            area_en: record.text(&AREA_EN),
            station_type: record.text(&STATION_TYPE),
            latitude: record.get(LAT.column).and_then(coerce_float),
            longitude: record.get(LONG.column).and_then(coerce_float),
            pm25_color_id,
            pm25_index,
        })
    }
}
