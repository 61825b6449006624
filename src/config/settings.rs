use std::str::FromStr;
use std::time::Duration;

use crate::datalayer::db_ops::constants::ConnectionConfig;
use crate::errors::errors::ServiceError;
use crate::logging::telemetry::{LogFormat, TelemetryConfig};

/*
Process configuration, read once at startup.
- Required: DB_HOST, DB_NAME, DB_USER, DB_PASSWORD. Every missing key is reported in one error.
- Everything else falls back to the ConnectionConfig / TelemetryConfig defaults.
- Durations are given in milliseconds (DB_*_MS).
- The connection manager never reads the environment, it only sees the ConnectionConfig built here.
*/

const REQUIRED_DB_KEYS: [&str; 4] = ["DB_HOST", "DB_NAME", "DB_USER", "DB_PASSWORD"];

const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
const DEFAULT_SERVER_PORT: u16 = 5000;

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database: ConnectionConfig,
    pub server: ServerSettings,
    pub telemetry: TelemetryConfig,
}

impl Settings {
    /// Loads `.env` (when present) and reads the process environment
    pub fn from_env() -> Result<Self, ServiceError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut problems = Vec::new();

        let missing: Vec<&str> = REQUIRED_DB_KEYS
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            problems.push(format!("missing required environment variables: {}", missing.join(", ")));
        }

        let mut database = ConnectionConfig::default()
            .set_host(get("DB_HOST").unwrap_or_default())
            .set_database(get("DB_NAME").unwrap_or_default())
            .set_user(get("DB_USER").unwrap_or_default())
            .set_password(get("DB_PASSWORD").unwrap_or_default());

        if let Some(port) = parse_key::<u16>(&get, "DB_PORT", &mut problems) {
            database = database.set_port(port);
        }
        if let Some(max) = parse_key::<u32>(&get, "DB_MAX_CONNECTIONS", &mut problems) {
            database = database.set_max_connections(max);
        }
        if let Some(min) = parse_key::<u32>(&get, "DB_MIN_CONNECTIONS", &mut problems) {
            database = database.set_min_connections(min);
        }
        if let Some(idle) = parse_millis(&get, "DB_IDLE_TIMEOUT_MS", &mut problems) {
            database = database.set_idle_timeout(idle);
        }
        if let Some(timeout) = parse_millis(&get, "DB_CONNECTION_TIMEOUT_MS", &mut problems) {
            database = database.set_connect_timeout(timeout);
        }
        if let Some(retries) = parse_key::<u32>(&get, "DB_MAX_RETRIES", &mut problems) {
            database = database.set_max_retries(retries);
        }
        if let Some(delay) = parse_millis(&get, "DB_RETRY_DELAY_MS", &mut problems) {
            database = database.set_retry_base_delay(delay);
        }
        if let Some(delay) = parse_millis(&get, "DB_RETRY_MAX_DELAY_MS", &mut problems) {
            database = database.set_retry_max_delay(delay);
        }
        if let Some(interval) = parse_millis(&get, "DB_HEALTH_CHECK_INTERVAL_MS", &mut problems) {
            database = database.set_health_check_interval(interval);
        }
        if let Some(threshold) = parse_millis(&get, "DB_SLOW_QUERY_MS", &mut problems) {
            database = database.set_slow_query_threshold(threshold);
        }

        let mut server = ServerSettings::default();
        if let Some(host) = get("HOST") {
            server.host = host;
        }
        if let Some(port) = parse_key::<u16>(&get, "PORT", &mut problems) {
            server.port = port;
        }

        let mut telemetry = TelemetryConfig::default();
        if let Some(level) = get("RUST_LOG") {
            telemetry = telemetry.with_log_level(level);
        }
        if let Some(format) = get("LOG_FORMAT") {
            telemetry = telemetry.with_log_format(LogFormat::parse(&format));
        }
        if let Some(endpoint) = get("OTEL_EXPORTER_OTLP_ENDPOINT") {
            telemetry = telemetry.with_otlp_endpoint(endpoint);
        }
        if let Some(enabled) = parse_flag(&get, "OTEL_ENABLE_TRACING", &mut problems) {
            telemetry = telemetry.with_tracing(enabled);
        }
        if let Some(enabled) = parse_flag(&get, "OTEL_ENABLE_METRICS", &mut problems) {
            telemetry = telemetry.with_metrics(enabled);
        }

        // Range checks only make sense once every key parsed
        if problems.is_empty() {
            if let Err(ServiceError::ConfigurationError(msg)) = database.validate() {
                problems.push(msg);
            }
        }

        if !problems.is_empty() {
            return Err(ServiceError::ConfigurationError(problems.join("; ")));
        }

        Ok(Self {
            database,
            server,
            telemetry,
        })
    }
}

fn parse_key<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    problems: &mut Vec<String>,
) -> Option<T> {
    let raw = get(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            problems.push(format!("{} has an invalid value: {:?}", key, raw));
            None
        }
    }
}

fn parse_millis(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    problems: &mut Vec<String>,
) -> Option<Duration> {
    parse_key::<u64>(get, key, problems).map(Duration::from_millis)
}

fn parse_flag(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    problems: &mut Vec<String>,
) -> Option<bool> {
    let raw = get(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            problems.push(format!("{} has an invalid value: {:?}", key, raw));
            None
        }
    }
}
