use std::collections::HashSet;

use time::PrimitiveDateTime;

use crate::Reading;

/// Hashable identity of a reading, floats compared by bit pattern
#[derive(Debug, PartialEq, Eq, Hash)]
struct ReadingIdentity<'a> {
    timestamp: PrimitiveDateTime,
    station_id: &'a str,
    name_th: &'a str,
    name_en: &'a str,
    area_th: &'a str,
    area_en: &'a str,
    station_type: &'a str,
    latitude: Option<u64>,
    longitude: Option<u64>,
    pm25_color_id: Option<i64>,
    pm25_index: Option<u64>,
    partition: (i32, u8, u8, u8),
}

impl<'a> From<&'a Reading> for ReadingIdentity<'a> {
    fn from(reading: &'a Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            station_id: &reading.station_id,
            name_th: &reading.name_th,
            name_en: &reading.name_en,
            area_th: &reading.area_th,
            area_en: &reading.area_en,
            station_type: &reading.station_type,
            latitude: reading.latitude.map(f64::to_bits),
            longitude: reading.longitude.map(f64::to_bits),
            pm25_color_id: reading.pm25_color_id,
            pm25_index: reading.pm25_index.map(f64::to_bits),
            partition: (reading.year, reading.month, reading.day, reading.hour),
        }
    }
}

/// Drops rows identical in every column, keeping the first occurrence
pub fn deduplicate(readings: Vec<Reading>) -> Vec<Reading> {
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(readings.len());
        readings
            .iter()
            .map(|reading| seen.insert(ReadingIdentity::from(reading)))
            .collect()
    };

    readings
        .into_iter()
        .zip(keep)
        .filter_map(|(reading, keep)| keep.then_some(reading))
        .collect()
}

/// Negative index values are sentinels for "no reading"; they become missing and
/// are replaced by the station's last valid value. Leaves the table ordered by
/// (station, timestamp).
pub fn forward_fill_index(readings: &mut [Reading]) {
    for reading in readings.iter_mut() {
        if reading.pm25_index.is_some_and(|value| value < 0.0) {
            reading.pm25_index = None;
        }
    }

    readings.sort_by(|a, b| {
        a.station_id
            .cmp(&b.station_id)
            .then(a.timestamp.cmp(&b.timestamp))
    });

    let mut carried: Option<f64> = None;
    for i in 0..readings.len() {
        if i > 0 && readings[i].station_id != readings[i - 1].station_id {
            carried = None;
        }
        match readings[i].pm25_index {
            Some(value) => carried = Some(value),
            None => readings[i].pm25_index = carried,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    fn reading(station: &str, hour: i64, index: Option<f64>) -> Reading {
        let timestamp = datetime!(2025-05-04 0:00) + Duration::hours(hour);
        Reading {
            timestamp,
            station_id: station.to_string(),
            name_th: format!("สถานี {}", station),
            name_en: format!("Station {}", station),
            area_th: "กรุงเทพฯ".to_string(),
            area_en: "Bangkok".to_string(),
            station_type: "GROUND".to_string(),
            latitude: Some(13.7),
            longitude: Some(100.5),
            pm25_color_id: Some(1),
            pm25_index: index,
            year: 2025,
            month: 5,
            day: 4,
            hour: timestamp.hour(),
        }
    }

    fn indexes(readings: &[Reading]) -> Vec<Option<f64>> {
        readings.iter().map(|r| r.pm25_index).collect()
    }

    #[test]
    fn forward_fills_within_station() {
        let mut readings: Vec<Reading> = [-1.0, 5.0, -1.0, -1.0, 9.0]
            .iter()
            .enumerate()
            .map(|(hour, value)| reading("02t", hour as i64, Some(*value)))
            .collect();

        forward_fill_index(&mut readings);
        assert_eq!(
            indexes(&readings),
            vec![None, Some(5.0), Some(5.0), Some(5.0), Some(9.0)]
        );
    }

    #[test]
    fn fill_never_crosses_stations() {
        let mut readings = vec![
            reading("b", 1, Some(-1.0)),
            reading("a", 0, Some(30.0)),
            reading("a", 1, Some(-1.0)),
            reading("b", 0, Some(-1.0)),
        ];

        forward_fill_index(&mut readings);
        let order: Vec<(&str, u8)> = readings
            .iter()
            .map(|r| (r.station_id.as_str(), r.hour))
            .collect();
        assert_eq!(order, vec![("a", 0), ("a", 1), ("b", 0), ("b", 1)]);
        assert_eq!(
            indexes(&readings),
            vec![Some(30.0), Some(30.0), None, None]
        );
    }

    #[test]
    fn fills_over_out_of_order_input() {
        let mut readings = vec![
            reading("a", 2, None),
            reading("a", 0, Some(12.0)),
            reading("a", 1, Some(-1.0)),
        ];
        forward_fill_index(&mut readings);
        assert_eq!(indexes(&readings), vec![Some(12.0), Some(12.0), Some(12.0)]);
    }

    #[test]
    fn drops_exact_duplicates_only() {
        let mut changed = reading("a", 0, Some(12.0));
        changed.pm25_color_id = Some(2);

        let readings = vec![
            reading("a", 0, Some(12.0)),
            reading("a", 0, Some(12.0)),
            changed,
            reading("a", 1, Some(12.0)),
        ];
        let unique = deduplicate(readings);
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[1].pm25_color_id, Some(2));
    }

    #[test]
    fn duplicate_missing_values_collapse() {
        let readings = vec![reading("a", 0, None), reading("a", 0, None)];
        assert_eq!(deduplicate(readings).len(), 1);
    }
}
