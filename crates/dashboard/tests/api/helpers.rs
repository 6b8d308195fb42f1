use std::{sync::Arc, time::Duration};

use air4thai_core::{IndexColumn, LocalStore, NormalizedRow, PartitionStore};
use async_trait::async_trait;
use axum::Router;
use daemon::PartitionWriter;
use dashboard::{app, insights::Error, AppState, CachedDataset, Consolidator, InsightGenerator};
use mockall::mock;
use slog::{o, Discard, Logger};
use tempfile::TempDir;
use time::PrimitiveDateTime;

mock! {
    pub InsightGenerator {}
    #[async_trait]
    impl InsightGenerator for InsightGenerator {
        async fn generate(&self, context: &str) -> Result<String, Error>;
    }
}

pub struct TestApp {
    pub app: Router,
    _dir: TempDir,
}

pub fn discard_logger() -> Logger {
    Logger::root(Discard, o!())
}

pub fn local_store() -> (TempDir, Arc<dyn PartitionStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn PartitionStore> =
        Arc::new(LocalStore::new(dir.path().join("airquality.parquet")));
    (dir, store)
}

pub async fn write_rows(store: &Arc<dyn PartitionStore>, rows: &[NormalizedRow]) -> Vec<String> {
    PartitionWriter::new(discard_logger(), store.clone(), IndexColumn::Aqi)
        .write(rows)
        .await
        .unwrap()
}

pub async fn spawn_app(
    rows: &[NormalizedRow],
    insights: Option<Arc<dyn InsightGenerator>>,
) -> TestApp {
    let (dir, store) = local_store();
    if !rows.is_empty() {
        write_rows(&store, rows).await;
    }

    let dataset = Arc::new(CachedDataset::new(
        Consolidator::new(store),
        2025,
        Duration::from_secs(600),
    ));
    let app = app(AppState { dataset, insights });

    TestApp { app, _dir: dir }
}

pub fn row(
    station_id: &str,
    name_th: &str,
    area_th: &str,
    timestamp: PrimitiveDateTime,
    index: f64,
) -> NormalizedRow {
    NormalizedRow {
        timestamp,
        station_id: station_id.to_string(),
        name_th: name_th.to_string(),
        name_en: format!("Station {}", station_id),
        area_th: area_th.to_string(),
        area_en: format!("Area {}", station_id),
        station_type: "GROUND".to_string(),
        latitude: Some(13.7),
        longitude: Some(100.5),
        pm25_color_id: 2,
        pm25_index: index,
    }
}
