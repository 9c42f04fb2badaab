//! Configuration management

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{IngestionError, Result};
use crate::observability::TracingConfig;
use crate::services::cdc::KafkaLogConfig;
use crate::services::generator::GeneratorConfig;
use crate::services::sink::ClickHouseConfig;

/// Which producer drives the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fixed-rate synthetic user events, for smoke-testing the sink.
    Synthetic,
    /// Replicate the change stream of `app.users`.
    Cdc,
}

impl FromStr for Mode {
    type Err = IngestionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "synthetic" => Ok(Mode::Synthetic),
            "cdc" => Ok(Mode::Cdc),
            other => Err(IngestionError::Config(format!(
                "unknown mode '{}' (expected synthetic|cdc)",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Synthetic => f.write_str("synthetic"),
            Mode::Cdc => f.write_str("cdc"),
        }
    }
}

/// Process configuration, read from the environment.
///
/// Field names map to upper-case environment variables (`clickhouse_host` ->
/// `CLICKHOUSE_HOST`). Every field has a default so an empty environment yields
/// a runnable local setup.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    // ClickHouse
    #[serde(default = "default_clickhouse_host")]
    pub clickhouse_host: String,
    /// Not `CLICKHOUSE_PORT`: Kubernetes service links set that to `tcp://ip:port`.
    #[serde(default = "default_clickhouse_http_port")]
    pub clickhouse_http_port: u16,
    #[serde(default)]
    pub clickhouse_user: String,
    #[serde(default)]
    pub clickhouse_password: String,
    #[serde(default = "default_clickhouse_db")]
    pub clickhouse_db: String,
    #[serde(default = "default_clickhouse_table")]
    pub clickhouse_table: String,
    #[serde(default = "default_events_table")]
    pub events_table: String,
    #[serde(default = "default_clickhouse_timeout_secs")]
    pub clickhouse_timeout_secs: u64,

    // Kafka / Redpanda
    #[serde(default = "default_brokers")]
    pub redpanda_brokers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,

    // Synthetic generator
    #[serde(default = "default_event_rate")]
    pub event_rate: u32,
    #[serde(default = "default_ingestion_duration")]
    pub ingestion_duration: u64,

    // OpenTelemetry; export is off while the endpoint is empty
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: String,
    #[serde(default = "default_otel_sample_rate")]
    pub otel_sample_rate: f64,
}

fn default_mode() -> String {
    "synthetic".to_string()
}

fn default_service_name() -> String {
    "ingestion-service".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    8080
}

fn default_clickhouse_host() -> String {
    "localhost".to_string()
}

fn default_clickhouse_http_port() -> u16 {
    8123
}

fn default_clickhouse_db() -> String {
    "appdb".to_string()
}

fn default_clickhouse_table() -> String {
    "app.users_cur".to_string()
}

fn default_events_table() -> String {
    "events_db.events".to_string()
}

fn default_clickhouse_timeout_secs() -> u64 {
    10
}

fn default_brokers() -> String {
    "redpanda.redpanda.svc.cluster.local:9093".to_string()
}

fn default_topic() -> String {
    "dbserver1.app.users".to_string()
}

fn default_group_id() -> String {
    "wal-cdc-ingestor".to_string()
}

fn default_event_rate() -> u32 {
    5
}

fn default_ingestion_duration() -> u64 {
    60
}

fn default_otel_sample_rate() -> f64 {
    1.0
}

impl IngestionConfig {
    /// Load configuration from `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from explicit key/value pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(pairs)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mode = self.mode()?;
        if self.event_rate == 0 {
            return Err(IngestionError::Config(
                "EVENT_RATE must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.otel_sample_rate) {
            return Err(IngestionError::Config(
                "OTEL_SAMPLE_RATE must be between 0.0 and 1.0".to_string(),
            ));
        }
        if mode == Mode::Cdc && self.brokers().is_empty() {
            return Err(IngestionError::Config(
                "REDPANDA_BROKERS must list at least one broker in cdc mode".to_string(),
            ));
        }
        Ok(())
    }

    pub fn mode(&self) -> Result<Mode> {
        self.mode.parse()
    }

    pub fn brokers(&self) -> Vec<String> {
        split_csv(&self.redpanda_brokers)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Base URL of the ClickHouse HTTP interface.
    ///
    /// A host that already carries a scheme is taken verbatim.
    pub fn clickhouse_url(&self) -> String {
        let host = self.clickhouse_host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}:{}", host, self.clickhouse_http_port)
        }
    }

    pub fn clickhouse(&self) -> ClickHouseConfig {
        ClickHouseConfig {
            url: self.clickhouse_url(),
            user: Some(self.clickhouse_user.clone()).filter(|u| !u.is_empty()),
            password: self.clickhouse_password.clone(),
            database: self.clickhouse_db.clone(),
            table: self.clickhouse_table.clone(),
            events_table: self.events_table.clone(),
            timeout: Duration::from_secs(self.clickhouse_timeout_secs),
        }
    }

    pub fn kafka(&self) -> KafkaLogConfig {
        KafkaLogConfig {
            brokers: self.brokers(),
            topic: self.topic.clone(),
            group_id: self.group_id.clone(),
        }
    }

    /// Trace export settings. An endpoint without a scheme is taken as plain
    /// `http`, the way the OTLP collectors are reached inside the cluster.
    pub fn tracing(&self) -> TracingConfig {
        let endpoint = self.otel_exporter_otlp_endpoint.trim();
        let otlp_endpoint = match endpoint {
            "" => None,
            e if e.contains("://") => Some(e.to_string()),
            e => Some(format!("http://{}", e)),
        };

        TracingConfig {
            otlp_endpoint,
            sample_rate: self.otel_sample_rate,
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn generator(&self) -> GeneratorConfig {
        GeneratorConfig {
            rate: self.event_rate.max(1),
            duration: Duration::from_secs(self.ingestion_duration),
        }
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
