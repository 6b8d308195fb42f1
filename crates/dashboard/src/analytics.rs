//! Aggregations behind the dashboard views
//!
//! Everything here works on rows that already passed [`filter_readings`], i.e.
//! rows carrying a non-negative PM2.5 index.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};

use serde::{Serialize, Serializer};
use time::{Date, Duration, PrimitiveDateTime};

use crate::Reading;

/// Station selector meaning "no station filter"
pub const ALL_STATIONS: &str = "All Stations";

/// Stations plotted when no single station is selected
pub const SERIES_TOP_STATIONS: usize = 5;

const CATEGORY_EXAMPLES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct ReadingFilter {
    pub start: Date,
    pub end: Date,
    /// Thai station name; `None` selects every station
    pub station: Option<String>,
}

impl ReadingFilter {
    pub fn new(start: Date, end: Date, station: Option<&str>) -> Self {
        let station = station
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != ALL_STATIONS)
            .map(str::to_string);
        Self {
            start,
            end,
            station,
        }
    }

    /// Same station selection, restricted to a single day
    pub fn for_day(&self, day: Date) -> Self {
        Self {
            start: day,
            end: day,
            station: self.station.clone(),
        }
    }

    pub fn matches(&self, reading: &Reading) -> bool {
        let date = reading.timestamp.date();
        date >= self.start
            && date <= self.end
            && self
                .station
                .as_ref()
                .map_or(true, |station| &reading.name_th == station)
            && reading.pm25_index.is_some_and(|value| value >= 0.0)
    }
}

pub fn filter_readings<'a>(readings: &'a [Reading], filter: &ReadingFilter) -> Vec<&'a Reading> {
    readings.iter().filter(|r| filter.matches(r)).collect()
}

/// First and last date present in the table
pub fn date_bounds(readings: &[Reading]) -> Option<(Date, Date)> {
    let first = readings.iter().map(|r| r.timestamp.date()).min()?;
    let last = readings.iter().map(|r| r.timestamp.date()).max()?;
    Some((first, last))
}

/// Sorted, unique Thai station names
pub fn station_names(readings: &[Reading]) -> Vec<String> {
    readings
        .iter()
        .filter(|r| !r.name_th.is_empty())
        .map(|r| r.name_th.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn classify(index: f64) -> Self {
        if index <= 50.0 {
            AqiCategory::Good
        } else if index <= 100.0 {
            AqiCategory::Moderate
        } else if index <= 150.0 {
            AqiCategory::UnhealthyForSensitive
        } else if index <= 200.0 {
            AqiCategory::Unhealthy
        } else if index <= 300.0 {
            AqiCategory::VeryUnhealthy
        } else {
            AqiCategory::Hazardous
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitive => "Unhealthy for Sensitive",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for AqiCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: AqiCategory,
    pub count: usize,
    pub example_stations: String,
}

/// Up to three sorted unique names, with `...` when there are more
pub fn sample_stations<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let unique: BTreeSet<&str> = names.into_iter().collect();
    let examples: Vec<&str> = unique.iter().take(CATEGORY_EXAMPLES).copied().collect();
    let mut sample = examples.join(", ");
    if unique.len() > CATEGORY_EXAMPLES {
        sample.push_str("...");
    }
    sample
}

/// Row count and example stations per category, ordered from Good to Hazardous
pub fn category_summary(readings: &[&Reading]) -> Vec<CategorySummary> {
    let mut groups: BTreeMap<AqiCategory, Vec<&str>> = BTreeMap::new();
    for reading in readings {
        if let Some(index) = reading.pm25_index {
            groups
                .entry(AqiCategory::classify(index))
                .or_default()
                .push(&reading.name_th);
        }
    }

    groups
        .into_iter()
        .map(|(category, names)| CategorySummary {
            category,
            count: names.len(),
            example_stations: sample_stations(names),
        })
        .collect()
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Thai area with the highest mean index; ties go to the first area in name order
pub fn highest_area(readings: &[&Reading]) -> Option<(String, f64)> {
    let mut areas: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for reading in readings {
        if let Some(index) = reading.pm25_index {
            areas.entry(&reading.area_th).or_default().push(index);
        }
    }

    let mut best: Option<(&str, f64)> = None;
    for (area, values) in areas {
        let Some(area_mean) = mean(values) else {
            continue;
        };
        if best.map_or(true, |(_, best_mean)| area_mean > best_mean) {
            best = Some((area, area_mean));
        }
    }
    best.map(|(area, value)| (area.to_string(), value))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub avg_index: Option<f64>,
    pub avg_color_id: Option<f64>,
    /// Change against the day before the end date, when that day has data
    pub delta_index: Option<f64>,
    pub delta_color_id: Option<f64>,
    pub top_area: Option<String>,
    pub top_area_index: Option<f64>,
    pub delta_top_area_index: Option<f64>,
}

pub fn compute_kpis(all: &[Reading], filtered: &[&Reading], filter: &ReadingFilter) -> Kpis {
    let avg_index = mean(filtered.iter().filter_map(|r| r.pm25_index));
    let avg_color_id = mean(filtered.iter().filter_map(|r| r.pm25_color_id.map(|c| c as f64)));

    let previous = filter
        .end
        .checked_sub(Duration::days(1))
        .map(|day| filter_readings(all, &filter.for_day(day)))
        .unwrap_or_default();
    let prev_index = mean(previous.iter().filter_map(|r| r.pm25_index));
    let prev_color_id = mean(previous.iter().filter_map(|r| r.pm25_color_id.map(|c| c as f64)));

    let top = highest_area(filtered);
    let prev_top = highest_area(&previous);

    Kpis {
        avg_index,
        avg_color_id,
        delta_index: avg_index.zip(prev_index).map(|(now, before)| now - before),
        delta_color_id: avg_color_id
            .zip(prev_color_id)
            .map(|(now, before)| now - before),
        delta_top_area_index: top
            .as_ref()
            .zip(prev_top.as_ref())
            .map(|((_, now), (_, before))| now - before),
        top_area_index: top.as_ref().map(|(_, value)| *value),
        top_area: top.map(|(area, _)| area),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub station_id: String,
    pub name_th: String,
    pub latitude: f64,
    pub longitude: f64,
    pub mean_index: f64,
}

/// Mean index per located station; rows without coordinates are left out
pub fn map_points(readings: &[&Reading]) -> Vec<MapPoint> {
    let mut stations: BTreeMap<(&str, &str, u64, u64), (f64, f64, Vec<f64>)> = BTreeMap::new();
    for reading in readings {
        let (Some(latitude), Some(longitude), Some(index)) =
            (reading.latitude, reading.longitude, reading.pm25_index)
        else {
            continue;
        };
        stations
            .entry((
                reading.station_id.as_str(),
                reading.name_th.as_str(),
                latitude.to_bits(),
                longitude.to_bits(),
            ))
            .or_insert_with(|| (latitude, longitude, vec![]))
            .2
            .push(index);
    }

    stations
        .into_iter()
        .filter_map(|((station_id, name_th, _, _), (latitude, longitude, values))| {
            Some(MapPoint {
                station_id: station_id.to_string(),
                name_th: name_th.to_string(),
                latitude,
                longitude,
                mean_index: mean(values)?,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    #[serde(serialize_with = "serialize_point_time")]
    pub timestamp: PrimitiveDateTime,
    pub index: f64,
}

fn serialize_point_time<S: Serializer>(
    timestamp: &PrimitiveDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let text = timestamp
        .format(air4thai_core::TIMESTAMP_FORMAT)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&text)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name_th: String,
    pub mean_index: f64,
    pub points: Vec<SeriesPoint>,
}

/// Time series per station: the selected one, or the highest-mean stations
pub fn station_series(readings: &[&Reading], station: Option<&str>) -> Vec<Series> {
    let mut by_name: BTreeMap<&str, Vec<SeriesPoint>> = BTreeMap::new();
    for reading in readings {
        if station.is_some_and(|name| name != reading.name_th) {
            continue;
        }
        if let Some(index) = reading.pm25_index {
            by_name.entry(&reading.name_th).or_default().push(SeriesPoint {
                timestamp: reading.timestamp,
                index,
            });
        }
    }

    let mut series: Vec<Series> = by_name
        .into_iter()
        .filter_map(|(name, mut points)| {
            points.sort_by_key(|p| p.timestamp);
            Some(Series {
                name_th: name.to_string(),
                mean_index: mean(points.iter().map(|p| p.index))?,
                points,
            })
        })
        .collect();

    // stable sort keeps name order between equal means
    series.sort_by(|a, b| b.mean_index.total_cmp(&a.mean_index));
    series.truncate(SERIES_TOP_STATIONS);
    series
}

/// One column of the describe table
enum ColumnStats {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

const STAT_ROWS: [&str; 11] = [
    "count", "unique", "top", "freq", "mean", "std", "min", "25%", "50%", "75%", "max",
];

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

fn format_number(value: f64) -> String {
    format!("{:.6}", value)
}

impl ColumnStats {
    fn count(&self) -> usize {
        match self {
            ColumnStats::Numeric(values) => values.len(),
            ColumnStats::Text(values) => values.len(),
        }
    }

    fn cells(&self) -> BTreeMap<&'static str, String> {
        let mut cells = BTreeMap::new();
        cells.insert("count", format_number(self.count() as f64));
        match self {
            ColumnStats::Numeric(values) if !values.is_empty() => {
                let mut sorted = values.clone();
                sorted.sort_by(f64::total_cmp);
                let n = sorted.len() as f64;
                let avg = sorted.iter().sum::<f64>() / n;
                let std = if sorted.len() > 1 {
                    (sorted.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
                } else {
                    f64::NAN
                };
                cells.insert("mean", format_number(avg));
                cells.insert("std", format_number(std));
                cells.insert("min", format_number(sorted[0]));
                cells.insert("25%", format_number(quantile(&sorted, 0.25)));
                cells.insert("50%", format_number(quantile(&sorted, 0.5)));
                cells.insert("75%", format_number(quantile(&sorted, 0.75)));
                cells.insert("max", format_number(sorted[sorted.len() - 1]));
            }
            ColumnStats::Text(values) if !values.is_empty() => {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for value in values {
                    *counts.entry(value.as_str()).or_default() += 1;
                }
                let mut top: Option<(&str, usize)> = None;
                for (value, count) in &counts {
                    if top.map_or(true, |(_, best)| *count > best) {
                        top = Some((*value, *count));
                    }
                }
                cells.insert("unique", counts.len().to_string());
                if let Some((value, freq)) = top {
                    cells.insert("top", value.to_string());
                    cells.insert("freq", freq.to_string());
                }
            }
            _ => {}
        }
        cells
    }
}

fn text_stats<'a>(readings: &[&'a Reading], f: impl Fn(&'a Reading) -> &'a str) -> ColumnStats {
    ColumnStats::Text(
        readings
            .iter()
            .map(|r| f(r))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn numeric_stats(readings: &[&Reading], f: impl Fn(&Reading) -> Option<f64>) -> ColumnStats {
    ColumnStats::Numeric(readings.iter().filter_map(|r| f(r)).collect())
}

/// Describe-style statistics of the filtered table as a plain text grid
pub fn describe(readings: &[&Reading]) -> String {
    let columns: Vec<(&str, ColumnStats)> = vec![
        (
            "timestamp",
            ColumnStats::Text(
                readings
                    .iter()
                    .filter_map(|r| r.timestamp.format(air4thai_core::TIMESTAMP_FORMAT).ok())
                    .collect(),
            ),
        ),
        ("stationID", text_stats(readings, |r| r.station_id.as_str())),
        ("nameTH", text_stats(readings, |r| r.name_th.as_str())),
        ("nameEN", text_stats(readings, |r| r.name_en.as_str())),
        ("areaTH", text_stats(readings, |r| r.area_th.as_str())),
        ("areaEN", text_stats(readings, |r| r.area_en.as_str())),
        ("stationType", text_stats(readings, |r| r.station_type.as_str())),
        ("lat", numeric_stats(readings, |r| r.latitude)),
        ("long", numeric_stats(readings, |r| r.longitude)),
        ("PM25.color_id", numeric_stats(readings, |r| r.pm25_color_id.map(|c| c as f64))),
        ("PM25.aqi", numeric_stats(readings, |r| r.pm25_index)),
        ("year", numeric_stats(readings, |r| Some(f64::from(r.year)))),
        ("month", numeric_stats(readings, |r| Some(f64::from(r.month)))),
        ("day", numeric_stats(readings, |r| Some(f64::from(r.day)))),
        ("hour", numeric_stats(readings, |r| Some(f64::from(r.hour)))),
    ];

    let cells: Vec<(&str, BTreeMap<&'static str, String>)> = columns
        .iter()
        .map(|(name, stats)| (*name, stats.cells()))
        .collect();

    let label_width = STAT_ROWS.iter().map(|s| s.len()).max().unwrap_or_default();
    let widths: Vec<usize> = cells
        .iter()
        .map(|(name, column)| {
            column
                .values()
                .map(|v| v.chars().count())
                .chain([name.chars().count(), 3])
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut out = String::new();
    let _ = write!(out, "{:label_width$}", "");
    for ((name, _), width) in cells.iter().zip(&widths) {
        let _ = write!(out, "  {:>width$}", name, width = *width);
    }
    out.push('\n');

    for stat in STAT_ROWS {
        let _ = write!(out, "{:label_width$}", stat);
        for ((_, column), width) in cells.iter().zip(&widths) {
            let cell = column.get(stat).map(String::as_str).unwrap_or("NaN");
            let _ = write!(out, "  {:>width$}", cell, width = *width);
        }
        out.push('\n');
    }
    out
}

/// Header of the CSV export, in [`Reading`] field order
pub const CSV_HEADER: [&str; 15] = [
    "timestamp",
    "stationID",
    "nameTH",
    "nameEN",
    "areaTH",
    "areaEN",
    "stationType",
    "lat",
    "long",
    "PM25.color_id",
    "PM25.aqi",
    "year",
    "month",
    "day",
    "hour",
];

/// CSV export of the filtered rows, header included
pub fn to_csv(readings: &[&Reading]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(vec![]);
    // serialize only emits the header along with the first row
    if readings.is_empty() {
        writer.write_record(CSV_HEADER)?;
    }
    for reading in readings {
        writer.serialize(reading)?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}
