use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Connection and resilience settings for the database.
///
/// Built once at startup (see `builder.rs` for defaults and the `set_*`
/// builder) and then moved into the connection manager, which never mutates it.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    /// Number of connection attempts made by one `connect()` sequence.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Upper bound of the multiplicative jitter added to each backoff delay.
    pub jitter_fraction: f64,
    pub health_check_interval: Duration,
    pub slow_query_threshold: Duration,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("idle_timeout", &self.idle_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("retry_max_delay", &self.retry_max_delay)
            .field("jitter_fraction", &self.jitter_fraction)
            .field("health_check_interval", &self.health_check_interval)
            .field("slow_query_threshold", &self.slow_query_threshold)
            .finish()
    }
}

/// Lifecycle state of the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Healing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Healing => "healing",
        };
        f.write_str(name)
    }
}

/// Raw result of one statement as returned by a pool driver.
#[derive(Debug, Clone)]
pub struct RowSet<R> {
    pub rows: Vec<R>,
    /// Rows returned, or rows affected for statements that return none.
    pub row_count: u64,
}

impl<R> RowSet<R> {
    pub fn new(rows: Vec<R>, rows_affected: u64) -> Self {
        let row_count = if rows.is_empty() {
            rows_affected
        } else {
            rows.len() as u64
        };
        Self { rows, row_count }
    }
}

/// Successful query result with timing information
#[derive(Debug, Clone)]
pub struct QueryOutcome<R> {
    pub rows: Vec<R>,
    pub row_count: u64,
    pub duration: Duration,
    /// Set when `duration` exceeded the configured slow-query threshold.
    pub slow: bool,
}

/// Connection occupancy of the underlying pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOccupancy {
    pub total: u32,
    pub idle: u32,
    pub waiting: u32,
}

/// Events published by a pool driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// A new physical connection was opened.
    Connected,
    /// The pool hit a failure outside of any query call.
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of a single health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<PoolOccupancy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn healthy(timestamp: DateTime<Utc>, elapsed: Duration, occupancy: PoolOccupancy) -> Self {
        Self {
            status: HealthStatus::Healthy,
            timestamp,
            response_time_ms: elapsed.as_millis() as u64,
            connections: Some(occupancy),
            error: None,
        }
    }

    pub fn unhealthy(timestamp: DateTime<Utc>, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            timestamp,
            response_time_ms: elapsed.as_millis() as u64,
            connections: None,
            error: Some(error.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
