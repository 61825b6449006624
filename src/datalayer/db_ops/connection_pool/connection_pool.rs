use async_trait::async_trait;
use futures::TryStreamExt;
use sea_query::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Either, Postgres, Row};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::datalayer::db_ops::connection_pool::driver::PoolDriver;
use crate::datalayer::db_ops::connection_pool::pool_state_tracker::PoolStateTracker;
use crate::datalayer::db_ops::constants::{ConnectionConfig, PoolEvent, PoolOccupancy, RowSet};
use crate::errors::dberrors::BackendError;

/*
PostgreSQL pool driver backed by sqlx's PgPool.
- The pool is created lazily: building it never touches the network, the first
  checkout (the manager's verification probes) opens the first connection.
- sqlx already reconnects broken connections on checkout, so healing only has to
  re-verify that the server answers.
- Every physical connection opened by the pool is published as PoolEvent::Connected.
- A checkout that fails because the server is gone is published as PoolEvent::Error.
  A checkout that times out while every slot is busy is saturation, not an outage:
  it surfaces as an Other-class error and publishes nothing.
*/

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Connection pool wrapper for PostgreSQL database
#[derive(Clone)]
pub struct PgConnectionPool {
    pool: PgPool,
    tracker: Arc<PoolStateTracker>,
    events: broadcast::Sender<PoolEvent>,
}

impl PgConnectionPool {
    /// Creates the (lazy) pool from the given configuration
    pub fn new(config: &ConnectionConfig) -> Self {
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_connections = config.max_connections,
            "Creating lazy PostgreSQL connection pool"
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let connect_options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password);

        let connected_events = events.clone();
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .after_connect(move |_conn, _meta| {
                let events = connected_events.clone();
                Box::pin(async move {
                    // No subscribers yet is fine
                    let _ = events.send(PoolEvent::Connected);
                    Ok(())
                })
            })
            .connect_lazy_with(connect_options);

        Self {
            pool,
            tracker: Arc::new(PoolStateTracker::new()),
            events,
        }
    }

    /// Gets a connection from the pool, counting the caller as waiting meanwhile.
    /// The connection goes back to the pool when the PoolConnection is dropped.
    pub async fn get(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, sqlx::Error> {
        debug!(
            size = self.pool.size(),
            idle = self.pool.num_idle(),
            "Acquiring connection from pool"
        );

        self.tracker
            .track_checkout(self.pool.acquire())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to acquire connection from pool");
                if !self.is_saturated(&e) && is_outage(&e) {
                    // No subscribers yet is fine
                    let _ = self.events.send(PoolEvent::Error(e.to_string()));
                }
                e
            })
    }

    /// Checkout used by the driver calls, with saturation told apart from an outage
    async fn checkout(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, BackendError> {
        self.get().await.map_err(|e| {
            if self.is_saturated(&e) {
                BackendError::other(format!("connection pool exhausted: {}", e))
            } else {
                BackendError::from(e)
            }
        })
    }

    fn is_saturated(&self, err: &sqlx::Error) -> bool {
        pool_exhausted(
            err,
            self.pool.size(),
            self.pool.num_idle(),
            self.pool.options().get_max_connections(),
        )
    }

    /// Gets a reference to the underlying PgPool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tracker(&self) -> &PoolStateTracker {
        &self.tracker
    }
}

#[async_trait]
impl PoolDriver for PgConnectionPool {
    type Row = PgRow;

    async fn verify(&self, probes: &[&str]) -> Result<Option<String>, BackendError> {
        let mut conn = self.checkout().await?;

        let mut last_text = None;
        for probe in probes {
            let row = sqlx::query(probe).fetch_one(&mut *conn).await?;
            // Only text-typed results (version()) decode here, timestamps are skipped
            last_text = row.try_get::<String, _>(0).ok();
        }

        // Returned to the pool on drop
        drop(conn);
        Ok(last_text)
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<RowSet<PgRow>, BackendError> {
        let mut conn = self.checkout().await?;

        let query = bind_query(sqlx::query(sql), params);
        let mut rows = Vec::new();
        let mut rows_affected = 0;

        {
            let mut results = query.fetch_many(&mut *conn);
            while let Some(item) = results.try_next().await? {
                match item {
                    Either::Left(done) => rows_affected += done.rows_affected(),
                    Either::Right(row) => rows.push(row),
                }
            }
        }

        Ok(RowSet::new(rows, rows_affected))
    }

    fn occupancy(&self) -> PoolOccupancy {
        let total = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        PoolOccupancy {
            total,
            idle,
            waiting: self.tracker.waiting(),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    async fn close(&self) {
        if self.pool.is_closed() {
            return;
        }
        info!("Closing connection pool...");
        self.pool.close().await;
        info!("Connection pool closed successfully");
    }
}

/// Conversion from sqlx errors into the driver-neutral shape the classifier inspects
impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) => BackendError::database(code.into_owned(), db_err.message()),
                None => BackendError::other(db_err.message()),
            },
            sqlx::Error::Io(io_err) => BackendError::transport(io_error_code(io_err.kind()), err.to_string()),
            sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => BackendError::transport(None, err.to_string()),
            _ => BackendError::other(err.to_string()),
        }
    }
}

/// Acquire failures that mean the server cannot be reached
fn is_outage(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
    )
}

/// A timed-out checkout while every connection is open and busy
fn pool_exhausted(err: &sqlx::Error, size: u32, idle: usize, max_connections: u32) -> bool {
    matches!(err, sqlx::Error::PoolTimedOut) && size >= max_connections && idle == 0
}

/// errno-style names for the socket failures worth telling apart in logs
fn io_error_code(kind: std::io::ErrorKind) -> Option<&'static str> {
    use std::io::ErrorKind;

    match kind {
        ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        ErrorKind::ConnectionReset => Some("ECONNRESET"),
        ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
        ErrorKind::TimedOut => Some("ETIMEDOUT"),
        ErrorKind::BrokenPipe => Some("EPIPE"),
        _ => None,
    }
}

/// Binds sea-query values positionally onto a sqlx query
fn bind_query<'q>(
    mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
    values: Vec<Value>,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            Value::Bool(v) => query.bind(v),
            Value::TinyInt(v) => query.bind(v.map(|x| x as i16)),
            Value::SmallInt(v) => query.bind(v),
            Value::Int(v) => query.bind(v),
            Value::BigInt(v) => query.bind(v),
            Value::TinyUnsigned(v) => query.bind(v.map(|x| x as i16)),
            Value::SmallUnsigned(v) => query.bind(v.map(|x| x as i32)),
            Value::Unsigned(v) => query.bind(v.map(|x| x as i64)),
            Value::BigUnsigned(v) => query.bind(v.map(|x| x as i64)),
            Value::Float(v) => query.bind(v),
            Value::Double(v) => query.bind(v),
            Value::String(v) => query.bind(v.map(|s| *s)),
            Value::Char(v) => query.bind(v.map(|c| c.to_string())),
            Value::Bytes(v) => query.bind(v.map(|b| *b)),
            Value::Uuid(v) => query.bind(v.map(|u| *u)),
            Value::Json(v) => query.bind(v.map(|j| *j)),
            Value::ChronoDate(v) => query.bind(v.map(|d| *d)),
            Value::ChronoTime(v) => query.bind(v.map(|t| *t)),
            Value::ChronoDateTime(v) => query.bind(v.map(|dt| *dt)),
            Value::ChronoDateTimeUtc(v) => query.bind(v.map(|dt| *dt)),
            Value::ChronoDateTimeLocal(v) => query.bind(v.map(|dt| *dt)),
            Value::ChronoDateTimeWithTimeZone(v) => query.bind(v.map(|dt| *dt)),
        };
    }
    query
}
