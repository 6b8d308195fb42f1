#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("Failed to fetch stations: {0}")]
    Fetch(String),
    #[error("Missing field `{key}` in {context}")]
    MissingField { key: String, context: String },
    #[error("Cannot convert {column} value `{value}` in {context}")]
    TypeCoercion {
        column: String,
        value: String,
        context: String,
    },
    #[error("Snapshot contains no stations")]
    EmptyBatch,
    #[error("Failed to write partition: {0}")]
    Write(String),
}
