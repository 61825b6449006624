use std::time::Instant;

use crate::datalayer::db_ops::connection_pool::{PgConnectionPool, PoolDriver};
use crate::datalayer::db_ops::db_ops::ResilientConnectionManager;

/// Application state shared across all handlers
pub struct AppState<D: PoolDriver = PgConnectionPool> {
    /// The process-wide database connection manager
    pub db: ResilientConnectionManager<D>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl<D: PoolDriver> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            started_at: self.started_at,
        }
    }
}

impl<D: PoolDriver> AppState<D> {
    /// Create new application state around an already constructed manager
    pub fn new(db: ResilientConnectionManager<D>) -> Self {
        Self {
            db,
            started_at: Instant::now(),
        }
    }
}
