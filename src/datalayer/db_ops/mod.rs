pub mod classifier;
pub mod connection_pool;
pub mod constants;
pub mod db_health;
pub mod db_ops;

pub use classifier::{ErrorClassifier, SqlStateClassifier};
pub use connection_pool::{PgConnectionPool, PoolDriver};
pub use constants::{ConnectionConfig, ConnectionState, HealthReport, HealthStatus, QueryOutcome};
pub use db_ops::ResilientConnectionManager;
