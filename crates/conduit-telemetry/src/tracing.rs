//! OpenTelemetry distributed tracing.
//!
//! [`init_tracing`] installs a global tracer provider exporting over OTLP and
//! a W3C trace-context propagator. The tracing middleware then opens one span
//! per request through [`tracer`], parented on whatever [`extract_context`]
//! finds in the request metadata. Without an installed provider every span
//! is a no-op.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use opentelemetry::propagation::Extractor;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, TracerProvider};
use opentelemetry_sdk::Resource;

/// Name of the tracer the middleware opens spans with.
pub const TRACER_NAME: &str = "conduit";

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether spans are exported.
    pub enabled: bool,

    /// OTLP gRPC endpoint (e.g., `http://localhost:4317`).
    pub otlp_endpoint: String,

    /// Service name resource attribute.
    pub service_name: String,

    /// Service version resource attribute.
    pub service_version: String,

    /// Deployment environment resource attribute.
    pub environment: String,

    /// Sampling ratio (0.0 to 1.0).
    pub sample_ratio: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: "conduit-worker".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            sample_ratio: 1.0,
        }
    }
}

/// Installs the global tracer provider and propagator.
///
/// Returns the provider so the caller can flush it on shutdown.
///
/// # Errors
///
/// Returns `TelemetryError::TracingInit` if the exporter cannot be built.
pub fn init_tracing(config: &TracingConfig) -> TelemetryResult<Option<TracerProvider>> {
    if !config.enabled {
        return Ok(None);
    }

    let resource = Resource::new([
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_NAME,
            config.service_name.clone(),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::attribute::SERVICE_VERSION,
            config.service_version.clone(),
        ),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
        .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;

    let sampler = if config.sample_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if config.sample_ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(config.sample_ratio)))
    };

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_sampler(sampler)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    global::set_text_map_propagator(TraceContextPropagator::new());
    global::set_tracer_provider(provider.clone());

    Ok(Some(provider))
}

/// Returns the tracer spans are opened with.
#[must_use]
pub fn tracer() -> global::BoxedTracer {
    global::tracer(TRACER_NAME)
}

/// Extracts a parent context using the globally installed propagator.
pub fn extract_context<T: Extractor>(carrier: &T) -> opentelemetry::Context {
    global::get_text_map_propagator(|propagator| propagator.extract(carrier))
}
