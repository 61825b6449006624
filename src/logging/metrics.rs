use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};
use std::time::Duration;

use crate::logging::telemetry::{create_counter, create_histogram};

/// Instruments recorded by the connection manager.
///
/// Built from the global meter provider, so they are no-ops until
/// `init_telemetry` installs an exporter.
#[derive(Clone)]
pub struct DbMetrics {
    connect_attempts: Counter<u64>,
    heals: Counter<u64>,
    queries: Counter<u64>,
    query_errors: Counter<u64>,
    query_duration: Histogram<f64>,
}

impl std::fmt::Debug for DbMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbMetrics").finish_non_exhaustive()
    }
}

impl Default for DbMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DbMetrics {
    pub fn new() -> Self {
        Self {
            connect_attempts: create_counter(
                "db.connect.attempts",
                "Database connection attempts, labelled by outcome",
            ),
            heals: create_counter(
                "db.heal.started",
                "Self-heal sequences started after a connection failure",
            ),
            queries: create_counter("db.queries", "Statements executed through the pool"),
            query_errors: create_counter(
                "db.query.errors",
                "Failed statements, labelled by error class",
            ),
            query_duration: create_histogram(
                "db.query.duration_ms",
                "Statement execution time in milliseconds",
            ),
        }
    }

    pub fn record_connect_attempt(&self, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.connect_attempts
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }

    pub fn record_heal(&self, trigger: &'static str) {
        self.heals.add(1, &[KeyValue::new("trigger", trigger)]);
    }

    pub fn record_query(&self, duration: Duration, slow: bool) {
        self.queries.add(1, &[KeyValue::new("slow", slow)]);
        self.query_duration
            .record(duration.as_secs_f64() * 1000.0, &[]);
    }

    pub fn record_query_error(&self, connection_class: bool) {
        let class = if connection_class {
            "connection"
        } else {
            "statement"
        };
        self.query_errors.add(1, &[KeyValue::new("class", class)]);
    }
}
