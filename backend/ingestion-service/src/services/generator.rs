//! Synthetic event generator.
//!
//! Produces user events at a fixed rate for a fixed duration so the sink can
//! be exercised without a CDC source.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, info_span, warn, Instrument};

use crate::logging;
use crate::metrics::IngestionMetrics;
use crate::models::SyntheticEvent;
use crate::services::sink::Sink;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Events per second
    pub rate: u32,
    /// How long to generate before stopping
    pub duration: Duration,
}

impl GeneratorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.rate.max(1)
    }
}

pub struct EventGenerator {
    sink: Arc<dyn Sink>,
    metrics: IngestionMetrics,
    config: GeneratorConfig,
    shutdown: watch::Receiver<bool>,
}

impl EventGenerator {
    pub fn new(
        sink: Arc<dyn Sink>,
        metrics: IngestionMetrics,
        config: GeneratorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sink,
            metrics,
            config,
            shutdown,
        }
    }

    /// Generate until the configured duration elapses or shutdown is signalled.
    ///
    /// Returns the number of events generated. Insert failures are logged and
    /// do not stop generation.
    pub async fn run(mut self) -> u64 {
        info!(
            rate = self.config.rate,
            duration_secs = self.config.duration.as_secs(),
            "Starting event generator"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = tokio::time::sleep(self.config.duration);
        tokio::pin!(deadline);

        let mut generated = 0u64;
        loop {
            if *self.shutdown.borrow() {
                info!("Shutdown signal received, stopping generator");
                break;
            }

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Shutdown signal received, stopping generator");
                        break;
                    }
                }

                _ = &mut deadline => {
                    info!(generated, "Ingestion complete");
                    break;
                }

                _ = ticker.tick() => {
                    let span = info_span!("generate_event", trace_id = tracing::field::Empty);
                    span.record("trace_id", logging::trace_id(&span).as_str());
                    self.generate_one().instrument(span).await;
                    generated += 1;
                }
            }
        }

        generated
    }

    async fn generate_one(&self) {
        let event = SyntheticEvent::generate();

        if let Err(e) = self.sink.insert_event(&event).await {
            warn!(error = %e, "Failed to insert event");
        }

        info!(
            user_id = %event.user_id,
            action = event.action.as_str(),
            "Event generated"
        );
        self.metrics.generated_events_total.inc();
    }
}
