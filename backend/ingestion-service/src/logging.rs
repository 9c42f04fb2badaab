use opentelemetry::trace::{TraceContextExt, TraceId};
use opentelemetry_sdk::trace::Tracer;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. JSON output is meant for log
/// shipping; the text format is for local runs. When a tracer is given, spans
/// are also exported through it.
pub fn init(json: bool, tracer: Option<Tracer>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ingestion_service=debug,rdkafka=info".into());

    let telemetry = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_current_span(true)))
        .with((!json).then(|| fmt::layer()))
        .with(telemetry)
        .try_init();
}

/// Correlation id for the unit of work `span` covers.
///
/// This is the OpenTelemetry trace id when spans are exported, so log lines
/// and exported traces share one id. Without a tracer it is a random id.
pub fn trace_id(span: &Span) -> String {
    let trace_id = span.context().span().span_context().trace_id();
    if trace_id == TraceId::INVALID {
        Uuid::new_v4().simple().to_string()
    } else {
        trace_id.to_string()
    }
}
