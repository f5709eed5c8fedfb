//! Telemetry for Conduit
//!
//! Installs a `tracing` subscriber that logs to stderr and, when an exporter
//! is configured, ships spans to an OTLP collector.

mod metadata;

use conduit_config::TelemetryConfig;
use conduit_config::telemetry::exporters::{ExportProtocol, ExporterConfig};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Instrumentation scope reported for every exported span
const TRACER_NAME: &str = "conduit";

/// Keeps the span exporter alive; flushes and shuts it down on drop
#[must_use = "dropping the guard shuts down span export"]
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are exported over OTLP
    pub const fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown tracer provider: {e}");
        }
    }
}

/// Initialize telemetry from configuration
///
/// `log_filter` uses `EnvFilter` directive syntax; an invalid filter falls
/// back to `info`. The returned guard must be held for the lifetime of the
/// application.
///
/// # Errors
///
/// Returns an error if the OTLP exporter cannot be built
pub fn init(config: Option<&TelemetryConfig>, log_filter: &str) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![fmt_layer.boxed()];
    let mut guard = TelemetryGuard { tracer_provider: None };

    if let Some(telemetry_config) = config
        && let Some(exporter_config) = telemetry_config.trace_exporter()
    {
        let tracer_provider = init_tracer(telemetry_config, exporter_config)?;
        let tracer = tracer_provider.tracer(TRACER_NAME);
        layers.push(tracing_opentelemetry::layer().with_tracer(tracer).boxed());

        global::set_tracer_provider(tracer_provider.clone());
        guard.tracer_provider = Some(tracer_provider);
    }

    tracing_subscriber::registry().with(layers).with(filter).init();

    Ok(guard)
}

/// Build the tracer provider exporting through `exporter_config`
fn init_tracer(config: &TelemetryConfig, exporter_config: &ExporterConfig) -> anyhow::Result<SdkTracerProvider> {
    let exporter = build_span_exporter(exporter_config)?;

    Ok(SdkTracerProvider::builder()
        .with_resource(metadata::build_resource(config))
        .with_sampler(sampler(config))
        .with_batch_exporter(exporter)
        .build())
}

fn sampler(config: &TelemetryConfig) -> Sampler {
    let sampling_rate = config.tracing.as_ref().map_or(1.0, |t| t.sampling_rate);

    let sampler = if sampling_rate >= 1.0 {
        Sampler::AlwaysOn
    } else if sampling_rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(sampling_rate)
    };

    if config.tracing.as_ref().is_none_or(|t| t.parent_based) {
        Sampler::ParentBased(Box::new(sampler))
    } else {
        sampler
    }
}

/// Build OTLP span exporter based on protocol
fn build_span_exporter(config: &ExporterConfig) -> anyhow::Result<opentelemetry_otlp::SpanExporter> {
    use opentelemetry_otlp::SpanExporter;

    let exporter = match config.protocol {
        ExportProtocol::Grpc => SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build gRPC span exporter: {e}"))?,
        ExportProtocol::HttpProto => SpanExporter::builder()
            .with_http()
            .with_endpoint(config.endpoint.as_str())
            .with_headers(config.headers.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP span exporter: {e}"))?,
    };

    Ok(exporter)
}

#[cfg(test)]
mod tests {
    use conduit_config::telemetry::tracing::TracingConfig;

    use super::*;

    fn config_with_tracing(sampling_rate: f64, parent_based: bool) -> TelemetryConfig {
        TelemetryConfig {
            tracing: Some(TracingConfig {
                sampling_rate,
                parent_based,
                exporter: None,
            }),
            ..TelemetryConfig::default()
        }
    }

    #[test]
    fn sampler_defaults_to_parent_based_always_on() {
        let sampler = sampler(&TelemetryConfig::default());
        assert!(matches!(sampler, Sampler::ParentBased(_)));
    }

    #[test]
    fn sampler_uses_ratio_between_bounds() {
        let sampler = sampler(&config_with_tracing(0.5, false));
        assert!(matches!(sampler, Sampler::TraceIdRatioBased(rate) if (rate - 0.5).abs() < f64::EPSILON));
    }

    #[test]
    fn sampler_clamps_to_always_off() {
        let sampler = sampler(&config_with_tracing(0.0, false));
        assert!(matches!(sampler, Sampler::AlwaysOff));
    }
}
