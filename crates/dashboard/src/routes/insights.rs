use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use log::{error, info};
use serde_json::json;

use crate::{
    describe, filter_readings, format_date, load_consolidation, no_data, resolve_filter,
    AppState, Consolidation, ReadingsQuery, ALL_STATIONS,
};

pub async fn generate_insights(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReadingsQuery>,
) -> Result<Response, (StatusCode, String)> {
    let Some(generator) = state.insights.clone() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            crate::insights::Error::Disabled.to_string(),
        ));
    };

    let consolidation = load_consolidation(&state).await?;
    let dataset = match consolidation.as_ref() {
        Consolidation::NoData { year } => return Ok(no_data(*year)),
        Consolidation::Ready(dataset) => dataset,
    };

    let filter = resolve_filter(dataset, &query)?;
    let rows = filter_readings(&dataset.readings, &filter);
    if rows.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            String::from("Unable to analyze due to lack of data."),
        ));
    }

    let context = describe(&rows);
    info!("generating insights over {} rows", rows.len());
    let insight = generator.generate(&context).await.map_err(|e| {
        error!("error generating insights: {}", e);
        (
            StatusCode::BAD_GATEWAY,
            format!("Failed to generate insights: {}", e),
        )
    })?;

    Ok(Json(json!({
        "status": "ok",
        "start": format_date(filter.start),
        "end": format_date(filter.end),
        "station": filter.station.as_deref().unwrap_or(ALL_STATIONS),
        "insight": insight,
    }))
    .into_response())
}
