use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::Result;

/// Error reasons recorded under `ingestion_cdc_errors_total{reason}`.
pub const REASON_MALFORMED_PAYLOAD: &str = "malformed_payload";
pub const REASON_SINK: &str = "sink";

/// Counters and histograms shared by the CDC consumer, the generator and the sink.
///
/// Cloning is cheap: every metric handle is reference counted, so all clones
/// feed the same registry.
#[derive(Clone)]
pub struct IngestionMetrics {
    registry: Registry,
    /// Synthetic events produced by the generator
    pub generated_events_total: IntCounter,
    /// CDC messages fetched from the log
    pub cdc_messages_total: IntCounter,
    /// CDC messages skipped, by reason
    pub cdc_errors_total: IntCounterVec,
    /// Insert round trips started against ClickHouse
    pub insert_attempts_total: IntCounter,
    /// Insert round-trip latency
    pub insert_latency_seconds: Histogram,
    /// Failed inserts of any category
    pub insert_errors_total: IntCounter,
    /// Rows acknowledged by ClickHouse
    pub rows_inserted_total: IntCounter,
}

impl IngestionMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let generated_events_total = IntCounter::new(
            "ingestion_generated_events_total",
            "Total number of synthetic events generated",
        )?;

        let cdc_messages_total = IntCounter::new(
            "ingestion_cdc_messages_total",
            "Total number of CDC messages fetched from the change log",
        )?;

        let cdc_errors_total = IntCounterVec::new(
            Opts::new(
                "ingestion_cdc_errors_total",
                "Total number of CDC messages skipped, by reason",
            ),
            &["reason"],
        )?;

        let insert_attempts_total = IntCounter::new(
            "ingestion_clickhouse_insert_attempts_total",
            "Total number of insert attempts to ClickHouse",
        )?;

        let insert_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "ingestion_clickhouse_insert_latency_seconds",
            "Latency of inserts to ClickHouse in seconds",
        ))?;

        let insert_errors_total = IntCounter::new(
            "ingestion_clickhouse_insert_errors_total",
            "Total number of insert errors to ClickHouse",
        )?;

        let rows_inserted_total = IntCounter::new(
            "ingestion_clickhouse_rows_inserted_total",
            "Total number of rows inserted into ClickHouse",
        )?;

        for metric in [
            Box::new(generated_events_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(cdc_messages_total.clone()),
            Box::new(cdc_errors_total.clone()),
            Box::new(insert_attempts_total.clone()),
            Box::new(insert_latency_seconds.clone()),
            Box::new(insert_errors_total.clone()),
            Box::new(rows_inserted_total.clone()),
        ] {
            registry.register(metric)?;
        }

        Ok(Self {
            registry,
            generated_events_total,
            cdc_messages_total,
            cdc_errors_total,
            insert_attempts_total,
            insert_latency_seconds,
            insert_errors_total,
            rows_inserted_total,
        })
    }

    pub fn record_cdc_error(&self, reason: &str) {
        self.cdc_errors_total.with_label_values(&[reason]).inc();
    }

    pub fn cdc_errors(&self, reason: &str) -> u64 {
        self.cdc_errors_total.with_label_values(&[reason]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::IngestionError::Metrics(e.to_string()))
    }
}
