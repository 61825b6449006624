use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_DATABASE: &str = "reputation_management";
pub const DEFAULT_USER: &str = "postgres";

pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

// Retry policy
pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(2_000);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_JITTER_FRACTION: f64 = 0.1;

pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(1_000);

/// Probe sequence run on a freshly checked-out connection. A TCP-level
/// connect is not enough, each statement must round-trip.
pub const VERIFICATION_PROBES: [&str; 3] = [
    "SELECT 1 AS connectivity_test",
    "SELECT NOW() AS time_sync_check",
    "SELECT version() AS db_version",
];

pub const HEALTH_PROBE: &str = "SELECT 1 AS health_check";

/// SQL longer than this is truncated in log events.
pub const LOGGED_SQL_MAX_CHARS: usize = 100;
