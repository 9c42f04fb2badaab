//! Ingestion Service
//!
//! Replicates the `app.users` change stream into a ClickHouse current-state
//! table, and can generate synthetic user events to smoke-test the sink.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod services;

// Public re-exports
pub use config::{IngestionConfig, Mode};
pub use error::{IngestionError, Result};
pub use metrics::IngestionMetrics;
pub use observability::{Observability, TracingConfig};
