//! Logging setup and optional OTLP trace export.
//!
//! Console logging always goes through `tracing_subscriber::fmt`. With
//! `--observability` and `OTEL_EXPORTER_OTLP_ENDPOINT` set, spans are also
//! exported over OTLP/HTTP through a `tracing-opentelemetry` layer on the
//! same registry.

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const SERVICE_NAME: &str = "data-cleaner";

/// Where spans go besides the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceExport {
    Disabled,
    /// Export was asked for but no endpoint is configured.
    MissingEndpoint,
    Otlp { endpoint: String },
}

impl TraceExport {
    pub fn resolve(requested: bool, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if !requested {
            return Self::Disabled;
        }
        match lookup(OTLP_ENDPOINT_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            Some(endpoint) => Self::Otlp { endpoint },
            None => Self::MissingEndpoint,
        }
    }

    pub fn from_env(requested: bool) -> Self {
        Self::resolve(requested, |key| std::env::var(key).ok())
    }
}

/// OTLP/HTTP traces URL for a base collector endpoint.
pub fn traces_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/v1/traces") {
        base.to_string()
    } else {
        format!("{base}/v1/traces")
    }
}

/// Holds the tracer provider; call [`Telemetry::shutdown`] before exit so
/// buffered spans are flushed.
pub struct Telemetry {
    provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    pub fn exporting(&self) -> bool {
        self.provider.is_some()
    }

    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            if let Err(e) = provider.shutdown() {
                eprintln!("Warning: failed to flush traces: {e}");
            }
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the default level.
pub fn init(verbose: bool, export: &TraceExport) -> Result<Telemetry> {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let provider = match export {
        TraceExport::Otlp { endpoint } => Some(build_provider(endpoint)?),
        TraceExport::Disabled | TraceExport::MissingEndpoint => None,
    };
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(SERVICE_NAME)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .init();

    Ok(Telemetry { provider })
}

fn build_provider(endpoint: &str) -> Result<SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_http()
        .with_endpoint(traces_url(endpoint))
        .build()
        .context("Failed to build OTLP span exporter")?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .build())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_export_needs_flag_and_endpoint() {
        let env = lookup(&[(OTLP_ENDPOINT_VAR, "http://collector:4318")]);
        assert_eq!(TraceExport::resolve(false, &env), TraceExport::Disabled);
        assert_eq!(
            TraceExport::resolve(true, &env),
            TraceExport::Otlp {
                endpoint: "http://collector:4318".into()
            }
        );
        assert_eq!(
            TraceExport::resolve(true, lookup(&[])),
            TraceExport::MissingEndpoint
        );
        assert_eq!(
            TraceExport::resolve(true, lookup(&[(OTLP_ENDPOINT_VAR, "  ")])),
            TraceExport::MissingEndpoint
        );
    }

    #[test]
    fn test_traces_url() {
        assert_eq!(
            traces_url("http://localhost:4318"),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            traces_url("http://localhost:4318/"),
            "http://localhost:4318/v1/traces"
        );
        assert_eq!(
            traces_url("http://localhost:4318/v1/traces"),
            "http://localhost:4318/v1/traces"
        );
    }
}
