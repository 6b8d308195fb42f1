use crate::helpers::{discard_logger, local_store, row, write_rows};
use air4thai_core::IndexColumn;
use daemon::{Normalizer, PartitionWriter};
use dashboard::{Consolidation, Consolidator, Reading};
use serde_json::{json, Value};
use time::macros::datetime;

async fn consolidate(consolidator: &Consolidator) -> Vec<Reading> {
    match consolidator.load(2025).await.unwrap() {
        Consolidation::Ready(dataset) => dataset.readings,
        Consolidation::NoData { year } => panic!("no data for {}", year),
    }
}

#[tokio::test]
async fn written_rows_come_back_in_consolidation() {
    let (_dir, store) = local_store();
    let rows = vec![
        row("02t", "ก", "north", datetime!(2025-05-04 14:00), 41.0),
        row("05t", "ข", "south", datetime!(2025-05-04 14:00), 87.0),
        row("02t", "ก", "north", datetime!(2025-05-05 09:00), 33.0),
    ];
    let files = write_rows(&store, &rows).await;
    assert_eq!(files.len(), 2);

    let readings = consolidate(&Consolidator::new(store.clone())).await;
    assert_eq!(readings.len(), 3);

    let mut found: Vec<(String, String, f64)> = readings
        .iter()
        .map(|r| {
            (
                r.station_id.clone(),
                r.timestamp.to_string(),
                r.pm25_index.unwrap(),
            )
        })
        .collect();
    found.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let mut expected: Vec<(String, String, f64)> = rows
        .iter()
        .map(|r| (r.station_id.clone(), r.timestamp.to_string(), r.pm25_index))
        .collect();
    expected.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    assert_eq!(found, expected);

    let first = readings
        .iter()
        .find(|r| r.station_id == "05t")
        .unwrap();
    assert_eq!(first.name_en, "Station 05t");
    assert_eq!(first.latitude, Some(13.7));
    assert_eq!(first.pm25_color_id, Some(2));
    assert_eq!((first.year, first.month, first.day, first.hour), (2025, 5, 4, 14));
}

#[tokio::test]
async fn duplicate_snapshot_is_collapsed() {
    let (_dir, store) = local_store();
    let rows = vec![
        row("02t", "ก", "north", datetime!(2025-05-04 14:00), 41.0),
        row("05t", "ข", "south", datetime!(2025-05-04 14:00), 87.0),
    ];
    write_rows(&store, &rows).await;
    write_rows(&store, &rows).await;

    let consolidator = Consolidator::new(store.clone());
    assert_eq!(consolidator.discover(2025).await.unwrap().len(), 2);
    assert_eq!(consolidate(&consolidator).await.len(), 2);
}

#[tokio::test]
async fn missing_index_values_are_carried_forward() {
    let (_dir, store) = local_store();
    let rows = vec![
        row("02t", "ก", "north", datetime!(2025-05-04 10:00), -1.0),
        row("02t", "ก", "north", datetime!(2025-05-04 11:00), 5.0),
        row("02t", "ก", "north", datetime!(2025-05-04 12:00), -1.0),
        row("02t", "ก", "north", datetime!(2025-05-04 13:00), -1.0),
        row("02t", "ก", "north", datetime!(2025-05-04 14:00), 9.0),
    ];
    write_rows(&store, &rows).await;

    let readings = consolidate(&Consolidator::new(store.clone())).await;
    let values: Vec<Option<f64>> = readings.iter().map(|r| r.pm25_index).collect();
    assert_eq!(
        values,
        vec![None, Some(5.0), Some(5.0), Some(5.0), Some(9.0)]
    );
}

#[tokio::test]
async fn other_years_are_not_consolidated() {
    let (_dir, store) = local_store();
    write_rows(
        &store,
        &[row("02t", "ก", "north", datetime!(2024-12-31 23:00), 41.0)],
    )
    .await;

    let consolidation = Consolidator::new(store.clone()).load(2025).await.unwrap();
    assert_eq!(consolidation, Consolidation::NoData { year: 2025 });
}

fn station(id: &str, time: &str, aqi: &str) -> Value {
    json!({
        "stationID": id,
        "nameTH": format!("สถานี {}", id),
        "nameEN": format!("Station {}", id),
        "areaTH": "เขตปทุมวัน, กรุงเทพฯ",
        "areaEN": "Pathum Wan, Bangkok",
        "stationType": "GROUND",
        "lat": "13.732846",
        "long": "100.487662",
        "AQILast": {
            "date": "2025-05-04",
            "time": time,
            "PM25": { "color_id": "2", "aqi": aqi, "value": "24.3" }
        }
    })
}

#[tokio::test]
async fn normalized_snapshot_lands_in_one_hour_partition() {
    let (_dir, store) = local_store();
    let stations = vec![
        station("02t", "14:00", "41"),
        station("05t", "14:05", "87"),
        station("08t", "14:00", "-1"),
    ];
    let snapshot = Normalizer::default().normalize(&stations).unwrap();
    assert_eq!(snapshot.timestamp, datetime!(2025-05-04 14:00));

    let files = PartitionWriter::new(discard_logger(), store.clone(), IndexColumn::Aqi)
        .write(&snapshot.rows)
        .await
        .unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("year=2025/month=5/day=4/hour=14/"));

    let readings = consolidate(&Consolidator::new(store.clone())).await;
    assert_eq!(readings.len(), 3);
    assert!(readings.iter().all(|r| r.hour == 14));
    assert!(readings
        .iter()
        .all(|r| r.timestamp == datetime!(2025-05-04 14:00)));

    let missing = readings.iter().find(|r| r.station_id == "08t").unwrap();
    assert_eq!(missing.pm25_index, None);
}
