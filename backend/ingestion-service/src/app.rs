//! Mode dispatch.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::config::{IngestionConfig, Mode};
use crate::error::Result;
use crate::observability::Observability;
use crate::services::{CdcConsumer, ClickHouseSink, EventGenerator, KafkaChangeLog, Sink};

/// Run the configured mode until it finishes or `shutdown` flips.
///
/// Every failure, including setup of the sink and the change log, is returned
/// rather than raised so the caller can still tear down `observability`.
pub async fn run(
    config: &IngestionConfig,
    observability: &Observability,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let metrics = observability.metrics().clone();
    let sink: Arc<dyn Sink> =
        Arc::new(ClickHouseSink::new(config.clickhouse(), metrics.clone())?);

    match config.mode()? {
        Mode::Synthetic => {
            let generated =
                EventGenerator::new(sink, metrics, config.generator(), shutdown.clone())
                    .run()
                    .await;
            info!(generated, "Event generation finished, serving metrics until shutdown");

            wait_for_shutdown(shutdown).await;
            Ok(())
        }
        Mode::Cdc => {
            let log = KafkaChangeLog::connect(&config.kafka())?;
            CdcConsumer::new(log, sink, metrics, shutdown).run().await
        }
    }
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}
