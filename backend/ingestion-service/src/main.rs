use anyhow::{Context, Result};
use ingestion_service::{app, logging, IngestionConfig, Observability};
use tokio::sync::watch;

#[actix_web::main]
async fn main() -> Result<()> {
    let config = IngestionConfig::from_env().context("Failed to load configuration")?;
    let mode = config.mode()?;

    let observability = Observability::new(&config.service_name, config.tracing())
        .context("Failed to initialize observability")?;
    logging::init(config.json_logs(), observability.tracer());
    tracing::info!(
        mode = %mode,
        trace_export = observability.tracing_enabled(),
        "Starting {}",
        config.service_name
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    // from here on every exit path goes through observability.shutdown()
    let result = match observability.start_metrics_server(config.metrics_port) {
        Ok(()) => app::run(&config, &observability, shutdown_rx)
            .await
            .with_context(|| format!("{} mode failed", mode)),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to start metrics server")),
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }

    observability.shutdown().await;
    tracing::info!("{} stopped", config.service_name);
    result
}
