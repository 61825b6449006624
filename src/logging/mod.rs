pub mod metrics;
pub mod telemetry;

pub use metrics::DbMetrics;
pub use telemetry::{LogFormat, TelemetryConfig, init_telemetry, shutdown_telemetry};
