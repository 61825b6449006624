use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, Tracer},
};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const METER_NAME: &str = "reputation-shield-backend";

/// Log line format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Parses `LOG_FORMAT` values, anything but `json` is pretty
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Configuration for logging and OpenTelemetry
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for telemetry
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// OTLP endpoint (e.g., "http://localhost:4317")
    pub otlp_endpoint: String,
    /// Export metrics over OTLP
    pub enable_metrics: bool,
    /// Export spans over OTLP
    pub enable_tracing: bool,
    /// Log level filter, used when RUST_LOG is not set
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
            enable_metrics: false,
            enable_tracing: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Collector address, gRPC
    pub fn with_otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    pub fn with_tracing(mut self, enable: bool) -> Self {
        self.enable_tracing = enable;
        self
    }

    /// Filter directive used when `RUST_LOG` is unset
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}

type TelemetryResult<T> = Result<T, Box<dyn std::error::Error>>;

fn service_resource(config: &TelemetryConfig) -> Resource {
    use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};

    Resource::new([
        KeyValue::new(SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(SERVICE_VERSION, config.service_version.clone()),
    ])
}

/// Installs the global OTLP tracer provider and hands back the service tracer
fn otlp_tracer(config: &TelemetryConfig, resource: Resource) -> TelemetryResult<Tracer> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&config.otlp_endpoint);
    let trace_config = opentelemetry_sdk::trace::Config::default()
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource);

    let provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter)
        .with_trace_config(trace_config)
        .install_batch(runtime::Tokio)?;
    global::set_tracer_provider(provider.clone());

    Ok(provider.tracer(METER_NAME))
}

/// Installs the global OTLP meter provider, exporting every 30s
fn install_otlp_metrics(config: &TelemetryConfig, resource: Resource) -> TelemetryResult<()> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&config.otlp_endpoint);

    let provider = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(exporter)
        .with_resource(resource)
        .with_period(Duration::from_secs(30))
        .build()?;
    global::set_meter_provider(provider);

    Ok(())
}

/// Installs the global subscriber.
///
/// Log lines always go to stdout, pretty or JSON per `log_format`, filtered by
/// `RUST_LOG` and falling back to `log_level`. Spans are exported over OTLP when
/// `enable_tracing` is set, and the instruments from [`create_counter`] /
/// [`create_histogram`] are exported when `enable_metrics` is set. Fails if a
/// global subscriber is already installed.
///
/// ```no_run
/// use reputation_shield_backend::logging::{LogFormat, TelemetryConfig, init_telemetry};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     init_telemetry(Some(TelemetryConfig::default().with_log_format(LogFormat::Json)))?;
///     Ok(())
/// }
/// ```
pub fn init_telemetry(config: Option<TelemetryConfig>) -> TelemetryResult<()> {
    let config = config.unwrap_or_default();
    let resource = service_resource(&config);

    let tracer = if config.enable_tracing {
        Some(otlp_tracer(&config, resource.clone())?)
    } else {
        None
    };
    if config.enable_metrics {
        install_otlp_metrics(&config, resource)?;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_filter(filter)
            .boxed(),
    };
    let otel = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    tracing_subscriber::registry().with(stdout).with(otel).try_init()?;

    info!(
        service = %config.service_name,
        version = %config.service_version,
        otlp_endpoint = %config.otlp_endpoint,
        tracing = config.enable_tracing,
        metrics = config.enable_metrics,
        format = ?config.log_format,
        "Telemetry initialized"
    );

    Ok(())
}

/// Flushes pending spans and drops the global tracer provider
pub fn shutdown_telemetry() {
    info!("Shutting down telemetry");
    global::shutdown_tracer_provider();
}

fn service_meter() -> opentelemetry::metrics::Meter {
    global::meter(METER_NAME)
}

/// `u64` counter on the service meter
pub fn create_counter(name: &str, description: &str) -> opentelemetry::metrics::Counter<u64> {
    service_meter()
        .u64_counter(name.to_owned())
        .with_description(description.to_owned())
        .init()
}

/// `f64` histogram on the service meter
pub fn create_histogram(name: &str, description: &str) -> opentelemetry::metrics::Histogram<f64> {
    service_meter()
        .f64_histogram(name.to_owned())
        .with_description(description.to_owned())
        .init()
}
