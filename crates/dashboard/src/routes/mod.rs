pub mod dataset;
pub mod health;
pub mod insights;

pub use dataset::*;
pub use health::*;
pub use insights::*;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use log::error;
use serde::Deserialize;
use serde_json::json;
use time::{macros::format_description, Date};

use crate::{date_bounds, AppState, ConsolidatedDataset, Consolidation, ReadingFilter};

/// `start`/`end` as `YYYY-MM-DD`, both inclusive; `station` is a Thai station name
#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub station: Option<String>,
}

pub fn parse_date(value: &str) -> Result<Date, (StatusCode, String)> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid date `{}`, expected YYYY-MM-DD: {}", value, e),
        )
    })
}

pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

/// Missing bounds default to the first and last date of the table
pub fn resolve_filter(
    dataset: &ConsolidatedDataset,
    query: &ReadingsQuery,
) -> Result<ReadingFilter, (StatusCode, String)> {
    let bounds = date_bounds(&dataset.readings);
    let start = match (&query.start, bounds) {
        (Some(start), _) => parse_date(start)?,
        (None, Some((first, _))) => first,
        (None, None) => Date::MIN,
    };
    let end = match (&query.end, bounds) {
        (Some(end), _) => parse_date(end)?,
        (None, Some((_, last))) => last,
        (None, None) => Date::MAX,
    };
    if start > end {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "start {} is after end {}",
                format_date(start),
                format_date(end)
            ),
        ));
    }
    Ok(ReadingFilter::new(start, end, query.station.as_deref()))
}

pub fn no_data(year: i32) -> Response {
    Json(json!({
        "status": "no_data",
        "message": format!("No data found for {}", year),
    }))
    .into_response()
}

pub async fn load_consolidation(
    state: &Arc<AppState>,
) -> Result<Arc<Consolidation>, (StatusCode, String)> {
    state.dataset.consolidated().await.map_err(|e| {
        error!("error loading dataset: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to load dataset: {}", e),
        )
    })
}
