use async_trait::async_trait;
use sea_query::Value;
use tokio::sync::broadcast;

use crate::datalayer::db_ops::constants::{PoolEvent, PoolOccupancy, RowSet};
use crate::errors::dberrors::BackendError;

/// Pooled access to a relational database.
///
/// The connection manager only talks to the database through this trait,
/// which keeps retry, healing and health logic independent of the driver
/// and lets tests run against an in-memory pool.
#[async_trait]
pub trait PoolDriver: Send + Sync + 'static {
    /// Row type produced by `execute`
    type Row: Send + 'static;

    /// Checks out a single connection, runs every probe on it in order and
    /// returns the connection to the pool.
    ///
    /// Returns the first column of the last probe rendered as text, when it
    /// decodes as one (the server version for the standard probe sequence).
    async fn verify(&self, probes: &[&str]) -> Result<Option<String>, BackendError>;

    /// Executes one statement with positional parameters
    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<RowSet<Self::Row>, BackendError>;

    /// Current pool occupancy
    fn occupancy(&self) -> PoolOccupancy;

    /// Stream of pool-level events
    fn subscribe(&self) -> broadcast::Receiver<PoolEvent>;

    /// Releases every pooled connection. Must be idempotent.
    async fn close(&self);
}
