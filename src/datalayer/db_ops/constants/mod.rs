pub mod constants;
pub mod types;
pub use constants::{HEALTH_PROBE, LOGGED_SQL_MAX_CHARS, VERIFICATION_PROBES};
pub use types::{
    ConnectionConfig, ConnectionState, HealthReport, HealthStatus, PoolEvent, PoolOccupancy,
    QueryOutcome, RowSet,
};
