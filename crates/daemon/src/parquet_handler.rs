use std::collections::BTreeMap;
use std::sync::Arc;

use air4thai_core::{
    create_reading_schema, IndexColumn, NormalizedRow, PartitionKey, PartitionStore,
    TIMESTAMP_FORMAT,
};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RecordWriter;
use parquet_derive::ParquetRecordWriter;
use slog::{debug, info, Logger};
use uuid::Uuid;

use crate::IngestError;

// Field order follows `create_reading_schema`, the derive writes columns positionally.
// The two records differ only in the type of the index column.
#[derive(Debug, ParquetRecordWriter)]
pub struct AqiRecord {
    pub timestamp: String,
    pub station_id: String,
    pub name_th: String,
    pub name_en: String,
    pub area_th: String,
    pub area_en: String,
    pub station_type: String,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub pm25_color_id: i64,
    pub pm25_index: i64,
}

#[derive(Debug, ParquetRecordWriter)]
pub struct ValueRecord {
    pub timestamp: String,
    pub station_id: String,
    pub name_th: String,
    pub name_en: String,
    pub area_th: String,
    pub area_en: String,
    pub station_type: String,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub pm25_color_id: i64,
    pub pm25_index: f64,
}

fn format_timestamp(row: &NormalizedRow) -> Result<String, IngestError> {
    row.timestamp
        .format(TIMESTAMP_FORMAT)
        .map_err(|e| IngestError::Write(format!("failed to format timestamp: {}", e)))
}

impl TryFrom<&NormalizedRow> for AqiRecord {
    type Error = IngestError;

    fn try_from(row: &NormalizedRow) -> Result<Self, Self::Error> {
        if !row.pm25_index.is_finite() || row.pm25_index.fract() != 0.0 {
            return Err(IngestError::Write(format!(
                "station {}: AQI {} is not a whole number",
                row.station_id, row.pm25_index
            )));
        }
        Ok(AqiRecord {
            timestamp: format_timestamp(row)?,
            station_id: row.station_id.clone(),
            name_th: row.name_th.clone(),
            name_en: row.name_en.clone(),
            area_th: row.area_th.clone(),
            area_en: row.area_en.clone(),
            station_type: row.station_type.clone(),
            lat: row.latitude,
            long: row.longitude,
            pm25_color_id: row.pm25_color_id,
            pm25_index: row.pm25_index as i64,
        })
    }
}

impl TryFrom<&NormalizedRow> for ValueRecord {
    type Error = IngestError;

    fn try_from(row: &NormalizedRow) -> Result<Self, Self::Error> {
        Ok(ValueRecord {
            timestamp: format_timestamp(row)?,
            station_id: row.station_id.clone(),
            name_th: row.name_th.clone(),
            name_en: row.name_en.clone(),
            area_th: row.area_th.clone(),
            area_en: row.area_en.clone(),
            station_type: row.station_type.clone(),
            lat: row.latitude,
            long: row.longitude,
            pm25_color_id: row.pm25_color_id,
            pm25_index: row.pm25_index,
        })
    }
}

/// Encodes rows as one parquet file with a single row group
pub fn encode_partition(rows: &[NormalizedRow], index: IndexColumn) -> Result<Vec<u8>, IngestError> {
    match index {
        IndexColumn::Aqi => {
            let records = rows
                .iter()
                .map(AqiRecord::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            write_records(records.as_slice(), index)
        }
        IndexColumn::Value => {
            let records = rows
                .iter()
                .map(ValueRecord::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            write_records(records.as_slice(), index)
        }
    }
}

fn write_records<T>(records: &[T], index: IndexColumn) -> Result<Vec<u8>, IngestError>
where
    for<'a> &'a [T]: RecordWriter<T>,
{
    let schema = create_reading_schema(index)
        .map_err(|e| IngestError::Write(format!("failed to build schema: {}", e)))?;
    let props = WriterProperties::builder().build();

    let mut buffer = Vec::new();
    let mut writer = SerializedFileWriter::new(&mut buffer, Arc::new(schema), Arc::new(props))
        .map_err(|e| IngestError::Write(format!("failed to create parquet writer: {}", e)))?;
    let mut row_group = writer
        .next_row_group()
        .map_err(|e| IngestError::Write(format!("failed to create row group: {}", e)))?;
    records
        .write_to_row_group(&mut row_group)
        .map_err(|e| IngestError::Write(format!("failed to write rows: {}", e)))?;
    row_group
        .close()
        .map_err(|e| IngestError::Write(format!("failed to close row group: {}", e)))?;
    writer
        .close()
        .map_err(|e| IngestError::Write(format!("failed to close parquet writer: {}", e)))?;

    Ok(buffer)
}

/// Groups rows by partition
pub fn group_by_partition(rows: &[NormalizedRow]) -> BTreeMap<PartitionKey, Vec<NormalizedRow>> {
    let mut partitions: BTreeMap<PartitionKey, Vec<NormalizedRow>> = BTreeMap::new();
    for row in rows {
        partitions
            .entry(row.partition_key())
            .or_default()
            .push(row.clone());
    }
    partitions
}

/// Appends snapshots to the dataset, one new file per touched partition
pub struct PartitionWriter {
    logger: Logger,
    store: Arc<dyn PartitionStore>,
    index: IndexColumn,
}

impl PartitionWriter {
    pub fn new(logger: Logger, store: Arc<dyn PartitionStore>, index: IndexColumn) -> Self {
        Self {
            logger,
            store,
            index,
        }
    }

    /// Returns the keys of the files written. Files are only ever added; existing
    /// ones are never rewritten.
    pub async fn write(&self, rows: &[NormalizedRow]) -> Result<Vec<String>, IngestError> {
        let mut written = vec![];
        for (partition, rows) in group_by_partition(rows) {
            let key = format!("{}/{}.parquet", partition.path(), Uuid::now_v7());
            let body = encode_partition(&rows, self.index)?;
            debug!(
                self.logger,
                "writing {} rows ({} bytes) to {}",
                rows.len(),
                body.len(),
                key
            );
            self.store
                .put(&key, body)
                .await
                .map_err(|e| IngestError::Write(e.to_string()))?;
            info!(self.logger, "appended {}", self.store.location(&key));
            written.push(key);
        }
        Ok(written)
    }
}
