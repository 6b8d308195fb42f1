use slog::{error, info, warn, Logger};
use time::PrimitiveDateTime;

use crate::{IngestError, Normalizer, PartitionWriter, SnapshotSource};

#[derive(Debug, PartialEq)]
pub enum CycleOutcome {
    Written {
        snapshot: PrimitiveDateTime,
        rows: usize,
        files: Vec<String>,
    },
    /// The snapshot was fetched and normalized but not stored; the next cycle retries
    WriteFailed { snapshot: PrimitiveDateTime, reason: String },
}

/// One fetch, normalize, write pass
pub async fn run_cycle(
    logger: &Logger,
    source: &dyn SnapshotSource,
    normalizer: &Normalizer,
    writer: &PartitionWriter,
) -> Result<CycleOutcome, IngestError> {
    let stations = source.fetch_stations().await?;
    let snapshot = normalizer.normalize(&stations)?;

    for reason in &snapshot.skipped {
        warn!(logger, "skipped row: {}", reason);
    }
    let missing = snapshot
        .rows
        .iter()
        .filter(|row| !row.has_valid_index())
        .count();
    info!(
        logger,
        "normalized {} stations ({} without a PM2.5 reading) for snapshot {}",
        snapshot.rows.len(),
        missing,
        snapshot.timestamp
    );

    match writer.write(&snapshot.rows).await {
        Ok(files) => Ok(CycleOutcome::Written {
            snapshot: snapshot.timestamp,
            rows: snapshot.rows.len(),
            files,
        }),
        Err(err) => {
            error!(logger, "snapshot {} not stored: {}", snapshot.timestamp, err);
            Ok(CycleOutcome::WriteFailed {
                snapshot: snapshot.timestamp,
                reason: err.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::CoercionPolicy;
    use air4thai_core::{IndexColumn, LocalStore, PartitionStore};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use slog::{o, Discard};
    use time::macros::datetime;

    struct FixedSource(Vec<Value>);

    #[async_trait]
    impl SnapshotSource for FixedSource {
        async fn fetch_stations(&self) -> Result<Vec<Value>, IngestError> {
            Ok(self.0.clone())
        }
    }

    struct DownSource;

    #[async_trait]
    impl SnapshotSource for DownSource {
        async fn fetch_stations(&self) -> Result<Vec<Value>, IngestError> {
            Err(IngestError::Fetch(String::from("connection refused")))
        }
    }

    fn stations() -> Vec<Value> {
        ["02t", "05t"]
            .iter()
            .map(|id| {
                json!({
                    "stationID": id,
                    "nameTH": "ชื่อ",
                    "nameEN": "Name",
                    "areaTH": "พื้นที่",
                    "areaEN": "Area",
                    "stationType": "GROUND",
                    "lat": "13.7",
                    "long": "100.5",
                    "AQILast": {
                        "date": "2025-05-04",
                        "time": "14:00",
                        "PM25": { "color_id": "1", "aqi": "20", "value": "10.5" }
                    }
                })
            })
            .collect()
    }

    fn logger() -> Logger {
        Logger::root(Discard, o!())
    }

    #[tokio::test]
    async fn writes_snapshot_into_hour_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn PartitionStore> = Arc::new(LocalStore::new(dir.path()));
        let writer = PartitionWriter::new(logger(), store.clone(), IndexColumn::Aqi);
        let normalizer = Normalizer::new(IndexColumn::Aqi, CoercionPolicy::FailBatch);

        let outcome = run_cycle(&logger(), &FixedSource(stations()), &normalizer, &writer)
            .await
            .unwrap();

        match outcome {
            CycleOutcome::Written {
                snapshot,
                rows,
                files,
            } => {
                assert_eq!(snapshot, datetime!(2025-05-04 14:00));
                assert_eq!(rows, 2);
                assert_eq!(files.len(), 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            store.list("year=2025/month=5/day=4/hour=14/").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn fetch_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn PartitionStore> = Arc::new(LocalStore::new(dir.path()));
        let writer = PartitionWriter::new(logger(), store.clone(), IndexColumn::Aqi);

        let err = run_cycle(&logger(), &DownSource, &Normalizer::default(), &writer)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Fetch(_)));
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_snapshot_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn PartitionStore> = Arc::new(LocalStore::new(dir.path()));
        let writer = PartitionWriter::new(logger(), store.clone(), IndexColumn::Aqi);

        let err = run_cycle(&logger(), &FixedSource(vec![]), &Normalizer::default(), &writer)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyBatch));
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("lake");
        std::fs::write(&blocker, b"file").unwrap();
        let store: Arc<dyn PartitionStore> = Arc::new(LocalStore::new(&blocker));
        let writer = PartitionWriter::new(logger(), store, IndexColumn::Aqi);

        let outcome = run_cycle(
            &logger(),
            &FixedSource(stations()),
            &Normalizer::default(),
            &writer,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, CycleOutcome::WriteFailed { .. }));
    }
}
