use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use slog::{debug, info, Logger};

use crate::IngestError;

/// Source of the raw `stations` array of one snapshot
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_stations(&self) -> Result<Vec<Value>, IngestError>;
}

pub struct AqiFetcher {
    logger: Logger,
    client: Client,
    url: String,
}

impl AqiFetcher {
    pub fn new(
        logger: Logger,
        url: String,
        user_agent: String,
        timeout: Duration,
    ) -> Result<Self, IngestError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Fetch(format!("error building http client: {}", e)))?;
        Ok(Self {
            logger,
            client,
            url,
        })
    }
}

#[async_trait]
impl SnapshotSource for AqiFetcher {
    async fn fetch_stations(&self) -> Result<Vec<Value>, IngestError> {
        info!(self.logger, "fetching stations from {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| IngestError::Fetch(format!("error sending request: {}", e)))?
            .error_for_status()
            .map_err(|e| IngestError::Fetch(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| IngestError::Fetch(format!("error parsing body of request: {}", e)))?;

        let stations = extract_stations(body)?;
        let columns = stations
            .first()
            .and_then(Value::as_object)
            .map(|record| record.len())
            .unwrap_or_default();
        info!(
            self.logger,
            "received {} station records with {} top level fields",
            stations.len(),
            columns
        );
        debug!(self.logger, "first record: {:?}", stations.first());
        Ok(stations)
    }
}

/// Pulls the `stations` array out of a response document
pub fn extract_stations(mut body: Value) -> Result<Vec<Value>, IngestError> {
    match body.get_mut("stations").map(Value::take) {
        Some(Value::Array(stations)) => Ok(stations),
        Some(other) => Err(IngestError::Fetch(format!(
            "`stations` is not an array: {}",
            other
        ))),
        None => Err(IngestError::MissingField {
            key: String::from("stations"),
            context: String::from("API response"),
        }),
    }
}
