//! Process observability context.
//!
//! Built once in `main` and handed to every producer. Owns the metrics
//! registry, the `/metrics` HTTP server and the OpenTelemetry tracer, and is
//! torn down with [`Observability::shutdown`] before the process exits.

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpResponse, HttpServer};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::metrics::IngestionMetrics;

/// Trace export settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TracingConfig {
    /// OTLP gRPC collector, e.g. `http://alloy:4317`; no export when unset
    pub otlp_endpoint: Option<String>,
    /// Fraction of root traces kept (0.0 to 1.0)
    pub sample_rate: f64,
    pub service_version: String,
}

impl TracingConfig {
    pub fn disabled() -> Self {
        Self {
            otlp_endpoint: None,
            sample_rate: 1.0,
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub struct Observability {
    service_name: String,
    metrics: IngestionMetrics,
    tracer: Option<Tracer>,
    server: Mutex<Option<ServerHandle>>,
}

impl Observability {
    /// Build metrics and, when an endpoint is configured, the OTLP tracer.
    ///
    /// The tracer's batch exporter is spawned on the current tokio runtime.
    pub fn new(service_name: impl Into<String>, tracing: TracingConfig) -> Result<Self> {
        let service_name = service_name.into();
        let metrics = IngestionMetrics::new()?;

        #[cfg(target_os = "linux")]
        metrics.registry().register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        let tracer = match &tracing.otlp_endpoint {
            Some(endpoint) => Some(install_tracer(&service_name, &tracing, endpoint)?),
            None => None,
        };

        Ok(Self {
            service_name,
            metrics,
            tracer,
            server: Mutex::new(None),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn metrics(&self) -> &IngestionMetrics {
        &self.metrics
    }

    /// Tracer for the `tracing` subscriber's OpenTelemetry layer.
    pub fn tracer(&self) -> Option<Tracer> {
        self.tracer.clone()
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracer.is_some()
    }

    /// Serve `/metrics` and `/health` on `0.0.0.0:<port>` in the background.
    pub fn start_metrics_server(&self, port: u16) -> Result<()> {
        let metrics = self.metrics.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(metrics.clone()))
                .route("/metrics", web::get().to(metrics_handler))
                .route("/health", web::get().to(|| async { "OK" }))
        })
        .workers(1)
        .disable_signals()
        .bind(("0.0.0.0", port))?
        .run();

        let handle = server.handle();
        actix_web::rt::spawn(async move {
            if let Err(e) = server.await {
                error!("Metrics server error: {}", e);
            }
        });

        if let Ok(mut slot) = self.server.lock() {
            *slot = Some(handle);
        }

        info!(
            "Prometheus metrics available at http://{}:{}/metrics",
            self.service_name, port
        );
        Ok(())
    }

    /// Flush pending spans, stop the metrics server and log the final
    /// counter values.
    pub async fn shutdown(&self) {
        if self.tracer.is_some() {
            // the batch exporter runs on this runtime; block elsewhere while it drains
            match tokio::task::spawn_blocking(global::shutdown_tracer_provider).await {
                Ok(()) => info!("Tracer provider flushed"),
                Err(e) => warn!(error = %e, "Tracer provider shutdown failed"),
            }
        }

        let handle = self.server.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            handle.stop(true).await;
            info!("Metrics server stopped");
        } else {
            warn!("Observability shutdown without a running metrics server");
        }

        let m = &self.metrics;
        info!(
            generated_events = m.generated_events_total.get(),
            cdc_messages = m.cdc_messages_total.get(),
            rows_inserted = m.rows_inserted_total.get(),
            insert_errors = m.insert_errors_total.get(),
            "Observability shutdown complete"
        );
    }
}

fn install_tracer(service_name: &str, config: &TracingConfig, endpoint: &str) -> Result<Tracer> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = Resource::new(vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", config.service_version.clone()),
    ]);

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::config()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    config.sample_rate,
                ))))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .install_batch(runtime::Tokio)?;

    info!(
        service = service_name,
        endpoint,
        sample_rate = config.sample_rate,
        "OpenTelemetry trace export enabled"
    );
    Ok(tracer)
}

pub async fn metrics_handler(metrics: web::Data<IngestionMetrics>) -> HttpResponse {
    match metrics.render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    #[actix_web::test]
    async fn test_metrics_endpoint_renders_registry() {
        let observability =
            Observability::new("ingestion-service", TracingConfig::disabled()).unwrap();
        observability.metrics().rows_inserted_total.inc_by(3);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(observability.metrics().clone()))
                .route("/metrics", web::get().to(metrics_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("ingestion_clickhouse_rows_inserted_total 3"));
    }

    #[actix_web::test]
    async fn test_shutdown_without_server_is_noop() {
        let observability =
            Observability::new("ingestion-service", TracingConfig::disabled()).unwrap();
        observability.shutdown().await;
        assert_eq!(observability.service_name(), "ingestion-service");
        assert!(!observability.tracing_enabled());
    }

    #[actix_web::test]
    async fn test_tracer_is_built_and_flushed_on_shutdown() {
        let observability = Observability::new(
            "ingestion-service",
            TracingConfig {
                otlp_endpoint: Some("http://127.0.0.1:4317".to_string()),
                ..TracingConfig::disabled()
            },
        )
        .unwrap();
        assert!(observability.tracing_enabled());
        assert!(observability.tracer().is_some());

        tokio::time::timeout(std::time::Duration::from_secs(10), observability.shutdown())
            .await
            .expect("tracer flush did not complete");
    }
}
