//! ClickHouse sink.
//!
//! Each row is one HTTP round trip against the ClickHouse HTTP interface:
//! `POST /?query=INSERT INTO <table> FORMAT JSONEachRow` with the row as the
//! request body. There is no batching and no retry; callers decide what a
//! failure means for them.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

use crate::metrics::IngestionMetrics;
use crate::models::SyntheticEvent;
use crate::services::cdc::CanonicalRow;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to serialize row: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("clickhouse transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("clickhouse returned status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for canonical rows and synthetic events.
///
/// Implementations must tolerate concurrent calls from the CDC consumer and
/// the generator.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn insert_row(&self, row: &CanonicalRow) -> Result<(), SinkError>;

    async fn insert_event(&self, event: &SyntheticEvent) -> Result<(), SinkError>;
}

#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    /// Base URL of the HTTP interface, e.g. `http://clickhouse:8123`
    pub url: String,
    /// Basic auth user; no credentials are sent when unset
    pub user: Option<String>,
    pub password: String,
    pub database: String,
    /// Target table for CDC rows
    pub table: String,
    /// Target table for synthetic events
    pub events_table: String,
    pub timeout: Duration,
}

pub struct ClickHouseSink {
    client: reqwest::Client,
    config: ClickHouseConfig,
    metrics: IngestionMetrics,
}

impl ClickHouseSink {
    pub fn new(config: ClickHouseConfig, metrics: IngestionMetrics) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            metrics,
        })
    }

    pub fn config(&self) -> &ClickHouseConfig {
        &self.config
    }

    async fn insert_json<T>(&self, table: &str, row: &T) -> Result<(), SinkError>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.metrics.insert_attempts_total.inc();

        let body = match serde_json::to_vec(row) {
            Ok(body) => body,
            Err(e) => {
                self.metrics.insert_errors_total.inc();
                return Err(SinkError::Serialization(e));
            }
        };

        let started = Instant::now();
        let result = self.post(table, body).await;
        self.metrics
            .insert_latency_seconds
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(()) => {
                self.metrics.rows_inserted_total.inc();
                debug!(table, "ClickHouse insert ok");
            }
            Err(e) => {
                self.metrics.insert_errors_total.inc();
                warn!(table, error = %e, "ClickHouse insert failed");
            }
        }

        result
    }

    async fn post(&self, table: &str, body: Vec<u8>) -> Result<(), SinkError> {
        let query = format!("INSERT INTO {} FORMAT JSONEachRow", table);

        let mut request = self
            .client
            .post(&self.config.url)
            .query(&[
                ("query", query.as_str()),
                ("database", self.config.database.as_str()),
            ])
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if let Some(user) = &self.config.user {
            request = request.basic_auth(user, Some(&self.config.password));
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Sink for ClickHouseSink {
    async fn insert_row(&self, row: &CanonicalRow) -> Result<(), SinkError> {
        let table = self.config.table.as_str();
        self.insert_json(table, row)
            .instrument(info_span!("clickhouse.insert", table))
            .await
    }

    async fn insert_event(&self, event: &SyntheticEvent) -> Result<(), SinkError> {
        let table = self.config.events_table.as_str();
        self.insert_json(table, event)
            .instrument(info_span!("clickhouse.insert", table))
            .await
    }
}
