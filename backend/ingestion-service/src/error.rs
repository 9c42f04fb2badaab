use thiserror::Error;

use crate::services::sink::SinkError;

pub type Result<T> = std::result::Result<T, IngestionError>;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The change log could not produce the next message. Fatal for the consumer loop.
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Tracing error: {0}")]
    Tracing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<envy::Error> for IngestionError {
    fn from(err: envy::Error) -> Self {
        IngestionError::Config(err.to_string())
    }
}

impl From<prometheus::Error> for IngestionError {
    fn from(err: prometheus::Error) -> Self {
        IngestionError::Metrics(err.to_string())
    }
}

impl From<opentelemetry::trace::TraceError> for IngestionError {
    fn from(err: opentelemetry::trace::TraceError) -> Self {
        IngestionError::Tracing(err.to_string())
    }
}

impl From<std::io::Error> for IngestionError {
    fn from(err: std::io::Error) -> Self {
        IngestionError::Internal(err.to_string())
    }
}
