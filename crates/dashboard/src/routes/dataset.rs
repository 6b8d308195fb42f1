use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use log::error;
use serde_json::json;

use crate::{
    category_summary, compute_kpis, date_bounds, filter_readings, format_date, load_consolidation,
    map_points, no_data, resolve_filter, station_names, station_series, to_csv, AppState,
    Consolidation, ReadingsQuery, ALL_STATIONS,
};

pub async fn stations(
    State(state): State<Arc<AppState>>,
) -> Result<Response, (StatusCode, String)> {
    let consolidation = load_consolidation(&state).await?;
    let dataset = match consolidation.as_ref() {
        Consolidation::NoData { year } => return Ok(no_data(*year)),
        Consolidation::Ready(dataset) => dataset,
    };

    let bounds = date_bounds(&dataset.readings);
    Ok(Json(json!({
        "status": "ok",
        "year": dataset.year,
        "all_stations": ALL_STATIONS,
        "stations": station_names(&dataset.readings),
        "min_date": bounds.map(|(first, _)| format_date(first)),
        "max_date": bounds.map(|(_, last)| format_date(last)),
    }))
    .into_response())
}

pub async fn readings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReadingsQuery>,
) -> Result<Response, (StatusCode, String)> {
    let consolidation = load_consolidation(&state).await?;
    let dataset = match consolidation.as_ref() {
        Consolidation::NoData { year } => return Ok(no_data(*year)),
        Consolidation::Ready(dataset) => dataset,
    };

    let filter = resolve_filter(dataset, &query)?;
    let rows = filter_readings(&dataset.readings, &filter);
    Ok(Json(json!({
        "status": "ok",
        "start": format_date(filter.start),
        "end": format_date(filter.end),
        "station": filter.station.as_deref().unwrap_or(ALL_STATIONS),
        "count": rows.len(),
        "readings": rows,
    }))
    .into_response())
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReadingsQuery>,
) -> Result<Response, (StatusCode, String)> {
    let consolidation = load_consolidation(&state).await?;
    let dataset = match consolidation.as_ref() {
        Consolidation::NoData { year } => return Ok(no_data(*year)),
        Consolidation::Ready(dataset) => dataset,
    };

    let filter = resolve_filter(dataset, &query)?;
    let rows = filter_readings(&dataset.readings, &filter);
    if rows.is_empty() {
        return Ok(Json(json!({
            "status": "empty",
            "message": "No data found for the selected time or station.",
        }))
        .into_response());
    }

    Ok(Json(json!({
        "status": "ok",
        "start": format_date(filter.start),
        "end": format_date(filter.end),
        "station": filter.station.as_deref().unwrap_or(ALL_STATIONS),
        "kpis": compute_kpis(&dataset.readings, &rows, &filter),
        "categories": category_summary(&rows),
        "map": map_points(&rows),
        "series": station_series(&rows, filter.station.as_deref()),
    }))
    .into_response())
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReadingsQuery>,
) -> Result<Response, (StatusCode, String)> {
    let consolidation = load_consolidation(&state).await?;
    let dataset = match consolidation.as_ref() {
        Consolidation::NoData { year } => return Ok(no_data(*year)),
        Consolidation::Ready(dataset) => dataset,
    };

    let filter = resolve_filter(dataset, &query)?;
    let rows = filter_readings(&dataset.readings, &filter);
    let body = to_csv(&rows).map_err(|e| {
        error!("error writing csv: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to export csv: {}", e),
        )
    })?;

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=\"filtered_data.csv\""),
        ],
        body,
    )
        .into_response())
}
