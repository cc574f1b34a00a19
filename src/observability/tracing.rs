//! # Distributed Tracing
//!
//! Installs the global `tracing` subscriber: an `EnvFilter`, a pretty or JSON
//! fmt layer, and, when an OTLP endpoint is configured, an OpenTelemetry layer
//! exporting spans over gRPC.
//!
//! Spans that record `otel.status_code = "ERROR"` (failed Vault logins and
//! renewals) are exported as failed spans.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Build the level filter. `RUST_LOG` wins over the configured level.
pub fn build_env_filter(rust_log: Option<&str>, log_level: &str) -> Result<EnvFilter> {
    match rust_log.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| Error::observability(format!("Invalid RUST_LOG '{}': {}", directives, e))),
        None => EnvFilter::try_new(log_level)
            .map_err(|e| Error::observability(format!("Invalid log level '{}': {}", log_level, e))),
    }
}

/// Initialize logging and, if configured, OpenTelemetry span export.
///
/// Returns the tracer provider when OTLP export is enabled. Keep it and pass
/// it to [`shutdown_tracing`] before exit so buffered spans are flushed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<Option<SdkTracerProvider>> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_env_filter(rust_log.as_deref(), &config.log_level)?;

    let fmt_layer = if config.json_logging {
        tracing_subscriber::fmt::layer().json().with_current_span(true).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    let provider = match &config.otlp_endpoint {
        Some(endpoint) => Some(build_provider(&config.service_name, endpoint)?),
        None => None,
    };

    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .with(otel_layer)
        .try_init()
        .map_err(|e| Error::observability(format!("Failed to install tracing subscriber: {}", e)))?;

    if let Some(provider) = &provider {
        opentelemetry::global::set_tracer_provider(provider.clone());
        tracing::info!(
            otlp_endpoint = config.otlp_endpoint.as_deref().unwrap_or_default(),
            service_name = %config.service_name,
            "OpenTelemetry tracing initialized"
        );
    }

    Ok(provider)
}

fn build_provider(service_name: &str, endpoint: &str) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| {
            Error::observability(format!("Failed to build OTLP exporter for '{}': {}", endpoint, e))
        })?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(service_name.to_string()).build())
        .build())
}

/// Flush and stop span export.
pub fn shutdown_tracing(provider: Option<SdkTracerProvider>) {
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_from_log_level() {
        assert!(build_env_filter(None, "debug").is_ok());
        assert!(build_env_filter(Some("  "), "info").is_ok());
        assert!(build_env_filter(None, "tenant_secrets=trace,warn").is_ok());
    }

    #[test]
    fn test_rust_log_takes_precedence() {
        let filter = build_env_filter(Some("tenant_secrets=debug"), "not a [level").unwrap();
        assert!(filter.to_string().contains("tenant_secrets=debug"));
    }

    #[test]
    fn test_invalid_log_level() {
        let err = build_env_filter(None, "tenant_secrets=loud").unwrap_err();
        assert!(matches!(err, Error::Observability { .. }));
    }

    #[test]
    fn test_shutdown_without_provider() {
        shutdown_tracing(None);
    }
}
