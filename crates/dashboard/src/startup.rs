use std::sync::Arc;

use air4thai_core::open_store;
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::Request,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        Method,
    },
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use log::info;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    download, generate_insights, health, readings, stations, summary, AirQualityData,
    CachedDataset, ChatCompletionClient, Cli, Consolidator, InsightGenerator,
};

#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<dyn AirQualityData>,
    /// `None` when no API key is configured
    pub insights: Option<Arc<dyn InsightGenerator>>,
}

pub async fn build_app_state(cli: &Cli) -> Result<AppState, anyhow::Error> {
    let dataset_uri = cli.dataset()?;
    let settings = if dataset_uri.is_remote() {
        let settings = cli.s3_settings()?;
        info!("Using S3 endpoint: {}", settings.endpoint);
        Some(settings)
    } else {
        None
    };
    let store = open_store(&dataset_uri, settings.as_ref())
        .await
        .map_err(|e| anyhow!("error opening dataset {}: {}", dataset_uri, e))?;
    info!("Dataset storage initialized at {}", store.location(""));

    let dataset = Arc::new(CachedDataset::new(
        Consolidator::new(store),
        cli.year(),
        cli.cache_ttl(),
    ));

    let insights: Option<Arc<dyn InsightGenerator>> = match cli.llm_api_key() {
        Some(api_key) => Some(Arc::new(ChatCompletionClient::new(
            cli.llm_base_url(),
            cli.llm_model(),
            api_key,
        )?)),
        None => {
            info!("no LLM API key configured, insights disabled");
            None
        }
    };

    Ok(AppState { dataset, insights })
}

pub fn app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route("/stations", get(stations))
        .route("/readings", get(readings))
        .route("/summary", get(summary))
        .route("/download", get(download))
        .route("/insights", post(generate_insights))
        .with_state(Arc::new(app_state))
        .layer(middleware::from_fn(log_request))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default()
        .to_string();
    info!(target: "http_request", "new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}
