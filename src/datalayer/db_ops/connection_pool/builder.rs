use std::time::Duration;

use crate::datalayer::db_ops::constants::constants;
use crate::datalayer::db_ops::constants::ConnectionConfig;
use crate::errors::errors::ServiceError;

/*
Default configuration for the database connection and its retry policy.
- pool: max 20 connections, no eagerly opened connections
- idle_timeout: 30 seconds, connect_timeout: 10 seconds
- retries: 10 attempts, 2s base delay doubling per attempt, capped at 30s, up to 10% jitter
- health check every 30 seconds, queries above 1 second are flagged as slow
Credentials are never defaulted from the environment here, `config::Settings` does that.
*/
impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: constants::DEFAULT_HOST.to_string(),
            port: constants::DEFAULT_PORT,
            database: constants::DEFAULT_DATABASE.to_string(),
            user: constants::DEFAULT_USER.to_string(),
            password: String::new(),
            max_connections: constants::DEFAULT_MAX_CONNECTIONS,
            min_connections: constants::DEFAULT_MIN_CONNECTIONS,
            idle_timeout: constants::DEFAULT_IDLE_TIMEOUT,
            connect_timeout: constants::DEFAULT_CONNECT_TIMEOUT,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            retry_base_delay: constants::DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: constants::DEFAULT_RETRY_MAX_DELAY,
            jitter_fraction: constants::DEFAULT_JITTER_FRACTION,
            health_check_interval: constants::DEFAULT_HEALTH_CHECK_INTERVAL,
            slow_query_threshold: constants::DEFAULT_SLOW_QUERY_THRESHOLD,
        }
    }
}

// Builder pattern for ConnectionConfig
impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    pub fn set_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn set_database(mut self, database: String) -> Self {
        self.database = database;
        self
    }

    pub fn set_user(mut self, user: String) -> Self {
        self.user = user;
        self
    }

    pub fn set_password(mut self, password: String) -> Self {
        self.password = password;
        self
    }

    pub fn set_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn set_min_connections(mut self, min_connections: u32) -> Self {
        self.min_connections = min_connections;
        self
    }

    pub fn set_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn set_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn set_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn set_retry_base_delay(mut self, retry_base_delay: Duration) -> Self {
        self.retry_base_delay = retry_base_delay;
        self
    }

    pub fn set_retry_max_delay(mut self, retry_max_delay: Duration) -> Self {
        self.retry_max_delay = retry_max_delay;
        self
    }

    pub fn set_jitter_fraction(mut self, jitter_fraction: f64) -> Self {
        self.jitter_fraction = jitter_fraction;
        self
    }

    pub fn set_health_check_interval(mut self, health_check_interval: Duration) -> Self {
        self.health_check_interval = health_check_interval;
        self
    }

    pub fn set_slow_query_threshold(mut self, slow_query_threshold: Duration) -> Self {
        self.slow_query_threshold = slow_query_threshold;
        self
    }

    /// Rejects settings the manager cannot run with.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut problems = Vec::new();

        if self.host.trim().is_empty() {
            problems.push("host must not be empty".to_string());
        }
        if self.database.trim().is_empty() {
            problems.push("database must not be empty".to_string());
        }
        if self.max_connections == 0 {
            problems.push("max_connections must be at least 1".to_string());
        }
        if self.min_connections > self.max_connections {
            problems.push(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            ));
        }
        if self.max_retries == 0 {
            problems.push("max_retries must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            problems.push(format!(
                "jitter_fraction must be within [0, 1], got {}",
                self.jitter_fraction
            ));
        }
        if self.health_check_interval.is_zero() {
            problems.push("health_check_interval must be greater than zero".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::ConfigurationError(problems.join("; ")))
        }
    }
}
