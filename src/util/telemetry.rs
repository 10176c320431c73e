use std::time::Duration;

use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{self, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::util::env::Var;
use crate::var;

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>;

const DEFAULT_FILTER: &str = "environ_engine=debug,tower_http=debug,axum=debug,sqlx=info,info";
const STDOUT_EXPORTER: &str = "stdout";

/// Which exporters back the `tracing` subscriber.
#[derive(Debug)]
enum Exporters {
    /// Console output only
    Local,
    /// Spans printed by the opentelemetry stdout exporter
    Stdout(SdkTracerProvider),
    Otlp {
        logger_provider: SdkLoggerProvider,
        tracer_provider: SdkTracerProvider,
        meter_provider: SdkMeterProvider,
    },
}

#[derive(Debug)]
pub struct Telemetry {
    pub tracer_name: &'static str,
    exporters: Exporters,
}

impl Telemetry {
    pub async fn new() -> Result<Telemetry> {
        let collector_url = var!(Var::OtelExporterEndpoint).await?;
        let tracer_name = var!(Var::ApiTracerName).await?;
        let service_name = var!(Var::ApiServiceName).await?;
        let service_version = env!("CARGO_PKG_VERSION");

        let exporters = match collector_url {
            "" => Exporters::Local,
            STDOUT_EXPORTER => Exporters::Stdout(build_stdout_provider()),
            url => {
                let base_resource = base_attrs(service_name, service_version);
                Exporters::Otlp {
                    logger_provider: build_logger_provider(url, base_resource.clone())?,
                    tracer_provider: build_tracer_provider(url, base_resource.clone())?,
                    meter_provider: build_meter_provider(url, base_resource)?,
                }
            }
        };

        Ok(Self {
            tracer_name,
            exporters,
        })
    }

    pub fn register(self) -> Self {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        match &self.exporters {
            Exporters::Local => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer())
                    .init();
            }
            Exporters::Stdout(tracer_provider) => {
                global::set_tracer_provider(tracer_provider.clone());
                let trace_layer =
                    tracing_opentelemetry::layer().with_tracer(global::tracer(self.tracer_name));

                tracing_subscriber::registry()
                    .with(trace_layer)
                    .with(filter)
                    .with(fmt_layer())
                    .init();
            }
            Exporters::Otlp {
                logger_provider,
                tracer_provider,
                meter_provider,
            } => {
                global::set_tracer_provider(tracer_provider.clone());
                let trace_layer =
                    tracing_opentelemetry::layer().with_tracer(global::tracer(self.tracer_name));
                let log_layer = OpenTelemetryTracingBridge::new(logger_provider);
                let meter_layer = tracing_opentelemetry::MetricsLayer::new(meter_provider.clone());

                tracing_subscriber::registry()
                    .with(trace_layer)
                    .with(log_layer)
                    .with(meter_layer)
                    .with(filter)
                    .with(fmt_layer())
                    .init();
            }
        }

        self
    }

    pub fn shutdown(self) {
        match self.exporters {
            Exporters::Local => (),
            Exporters::Stdout(tracer_provider) => {
                if let Err(e) = tracer_provider.shutdown() {
                    eprintln!("error during tracing shutdown: {e:?}");
                }
            }
            Exporters::Otlp {
                logger_provider,
                tracer_provider,
                meter_provider,
            } => {
                if let Err(e) = meter_provider.shutdown() {
                    eprintln!("error during metering shutdown: {e:?}");
                }

                if let Err(e) = logger_provider.shutdown() {
                    eprintln!("error during logging shutdown: {e:?}");
                }

                if let Err(e) = tracer_provider.shutdown() {
                    eprintln!("error during tracing shutdown: {e:?}");
                }
            }
        }
    }
}

/// Console output layer, built per subscriber stack.
fn fmt_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
}

fn build_logger_provider(collector_url: &str, base_resource: Resource) -> Result<SdkLoggerProvider> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Logs.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

fn build_tracer_provider(collector_url: &str, base_resource: Resource) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Traces.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

fn build_meter_provider(collector_url: &str, base_resource: Resource) -> Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Metrics.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

fn build_stdout_provider() -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .with_id_generator(RandomIdGenerator::default())
        .with_sampler(Sampler::AlwaysOn)
        .build()
}

fn base_attrs(name: &'static str, version: &'static str) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", name),
            KeyValue::new("service.version", version),
        ])
        .build()
}

enum Endpoint {
    Logs,
    Traces,
    Metrics,
}

impl Endpoint {
    pub fn to_url(&self, collector_endpoint: &str) -> String {
        let location: &str = match self {
            Endpoint::Logs => "/v1/logs",
            Endpoint::Traces => "/v1/traces",
            Endpoint::Metrics => "/v1/metrics",
        };
        format!("{collector_endpoint}{location}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let base = "http://collector:4317";
        assert_eq!(Endpoint::Logs.to_url(base), "http://collector:4317/v1/logs");
        assert_eq!(Endpoint::Traces.to_url(base), "http://collector:4317/v1/traces");
        assert_eq!(Endpoint::Metrics.to_url(base), "http://collector:4317/v1/metrics");
    }

    #[test]
    fn test_fmt_layer_stacks() {
        let local = tracing_subscriber::registry()
            .with(EnvFilter::new("debug"))
            .with(fmt_layer());
        tracing::subscriber::with_default(local, || tracing::debug!("local stack"));

        let traced = tracing_subscriber::registry()
            .with(tracing_opentelemetry::layer())
            .with(EnvFilter::new("debug"))
            .with(fmt_layer());
        tracing::subscriber::with_default(traced, || {
            let span = tracing::info_span!("request");
            let _guard = span.enter();
            tracing::info!("traced stack");
        });
    }
}
