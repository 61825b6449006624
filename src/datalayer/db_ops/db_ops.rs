use sea_query::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::datalayer::db_ops::classifier::{ErrorClassifier, SqlStateClassifier};
use crate::datalayer::db_ops::connection_pool::{PgConnectionPool, PoolDriver};
use crate::datalayer::db_ops::constants::{
    ConnectionConfig, ConnectionState, LOGGED_SQL_MAX_CHARS, PoolEvent, PoolOccupancy, QueryOutcome,
    VERIFICATION_PROBES,
};
use crate::datalayer::db_ops::db_health::run_health_monitor;
use crate::datalayer::helper::backoff::ExponentialBackoff;
use crate::errors::dberrors::{BackendError, DbError};
use crate::logging::metrics::DbMetrics;

/*
Resilient connection manager.
- State machine: Disconnected -> Connecting -> Connected, Connected -> Healing -> Connecting
  on a connection-class failure, Connecting -> Disconnected once retries are exhausted.
- The state lives in a watch channel. Every transition is a check-and-set under the
  channel lock, so only one connect sequence can run at a time.
- query() never waits for a reconnect: it fails fast unless Connected.
- The health monitor and pool observer are background tasks holding a Weak reference,
  they never keep the manager alive on their own.
- close() flips the shutdown flag first. Anything that would arm a task or mark the
  manager Connected re-checks the flag under a lock, so nothing outlives close().
*/

/// Shared state behind every clone of the manager
pub(crate) struct Inner<D: PoolDriver> {
    config: ConnectionConfig,
    driver: D,
    classifier: Arc<dyn ErrorClassifier>,
    backoff: ExponentialBackoff,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    shutdown: watch::Sender<bool>,
    health_monitor: Mutex<Option<JoinHandle<()>>>,
    pool_observer: Mutex<Option<JoinHandle<()>>>,
    metrics: DbMetrics,
}

/// Database connection manager with retry, self-heal and health probing.
///
/// Cloning is cheap and every clone drives the same pool and state.
pub struct ResilientConnectionManager<D: PoolDriver = PgConnectionPool> {
    inner: Arc<Inner<D>>,
}

impl<D: PoolDriver> Clone for ResilientConnectionManager<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: PoolDriver> std::fmt::Debug for ResilientConnectionManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientConnectionManager")
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .field("closed", &self.is_closed())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl ResilientConnectionManager<PgConnectionPool> {
    /// Manager over a lazy PostgreSQL pool. Nothing touches the network until `connect()`.
    pub fn postgres(config: ConnectionConfig) -> Self {
        let driver = PgConnectionPool::new(&config);
        Self::new(config, driver)
    }
}

impl<D: PoolDriver> ResilientConnectionManager<D> {
    /// Creates a manager using the PostgreSQL SQLSTATE classifier
    pub fn new(config: ConnectionConfig, driver: D) -> Self {
        Self::with_classifier(config, driver, SqlStateClassifier::postgres())
    }

    /// Creates a manager with a custom connection-error classifier
    pub fn with_classifier<C>(config: ConnectionConfig, driver: D, classifier: C) -> Self
    where
        C: ErrorClassifier + 'static,
    {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                backoff: ExponentialBackoff::from_config(&config),
                config,
                driver,
                classifier: Arc::new(classifier),
                state,
                attempts: AtomicU32::new(0),
                shutdown,
                health_monitor: Mutex::new(None),
                pool_observer: Mutex::new(None),
                metrics: DbMetrics::new(),
            }),
        }
    }

    pub(crate) fn upgrade(inner: &Weak<Inner<D>>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Connects with retry. Returns false once every attempt has failed.
    ///
    /// The manager never exits the process, deciding what to do with a
    /// `false` is up to the caller.
    pub async fn connect(&self) -> bool {
        match self.try_connect().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Database connection failed");
                false
            }
        }
    }

    /// Connects with retry, surfacing `DbError::ExhaustedRetries` after the final attempt.
    ///
    /// - Connected: no-op.
    /// - Connecting: waits for the sequence already in flight and reports its outcome.
    /// - Disconnected or Healing: runs a new attempt sequence.
    #[instrument(skip(self), fields(host = %self.inner.config.host, database = %self.inner.config.database))]
    pub async fn try_connect(&self) -> Result<(), DbError> {
        if self.is_closed() {
            return Err(DbError::Closed);
        }

        let mut observed = ConnectionState::Disconnected;
        let claimed = self.inner.state.send_if_modified(|state| {
            observed = *state;
            match *state {
                ConnectionState::Disconnected | ConnectionState::Healing => {
                    *state = ConnectionState::Connecting;
                    true
                }
                ConnectionState::Connecting | ConnectionState::Connected => false,
            }
        });

        if claimed {
            return self.run_attempts().await;
        }

        match observed {
            ConnectionState::Connected => {
                debug!("Already connected");
                Ok(())
            }
            _ => {
                debug!("Connect already in progress, waiting for its outcome");
                self.await_in_flight().await
            }
        }
    }

    async fn await_in_flight(&self) -> Result<(), DbError> {
        let mut changes = self.inner.state.subscribe();
        let settled = changes
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map(|state| *state);

        match settled {
            Ok(ConnectionState::Connected) => Ok(()),
            _ if self.is_closed() => Err(DbError::Closed),
            Ok(state) => Err(DbError::NotConnected { state }),
            Err(_) => Err(DbError::Closed),
        }
    }

    /// One attempt sequence. Caller has already moved the state to Connecting.
    async fn run_attempts(&self) -> Result<(), DbError> {
        let inner = &self.inner;
        // A zero retry budget still gets one attempt
        let max_attempts = inner.config.max_retries.max(1);
        let mut shutdown = inner.shutdown.subscribe();
        let mut last_error = BackendError::other("no connection attempt was made");

        for attempt in 1..=max_attempts {
            if *shutdown.borrow() {
                return self.abandon_connect();
            }

            inner.attempts.store(attempt, Ordering::SeqCst);
            info!(attempt, max_attempts, "Attempting database connection");

            match inner.driver.verify(&VERIFICATION_PROBES).await {
                Ok(server_version) => {
                    inner.metrics.record_connect_attempt(true);
                    return self.mark_connected(attempt, server_version);
                }
                Err(e) => {
                    inner.metrics.record_connect_attempt(false);
                    if is_final_stretch(attempt, max_attempts) {
                        error!(attempt, max_attempts, error = %e, "Database connection attempt failed");
                    } else {
                        warn!(attempt, max_attempts, error = %e, "Database connection attempt failed");
                    }
                    last_error = e;
                }
            }

            if attempt < max_attempts {
                let delay = inner.backoff.delay_for(attempt);
                info!(
                    delay_ms = delay.as_millis() as u64,
                    next_attempt = attempt + 1,
                    "Retrying database connection"
                );

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown.wait_for(|closed| *closed) => {
                        return self.abandon_connect();
                    }
                }
            }
        }

        // close() during the last attempt wins over exhaustion
        if *shutdown.borrow() {
            return self.abandon_connect();
        }

        inner.state.send_replace(ConnectionState::Disconnected);
        error!(
            attempts = max_attempts,
            last_error = %last_error,
            "All database connection attempts failed"
        );

        Err(DbError::ExhaustedRetries {
            attempts: max_attempts,
            last_error,
        })
    }

    fn mark_connected(&self, attempt: u32, server_version: Option<String>) -> Result<(), DbError> {
        let inner = &self.inner;
        let mut closed = false;
        inner.state.send_modify(|state| {
            if *inner.shutdown.borrow() {
                closed = true;
                *state = ConnectionState::Disconnected;
            } else {
                *state = ConnectionState::Connected;
            }
        });

        if closed {
            debug!("Manager closed while connecting, dropping verified connection");
            return Err(DbError::Closed);
        }

        inner.attempts.store(0, Ordering::SeqCst);
        info!(
            attempt,
            server_version = server_version.as_deref().unwrap_or("unknown"),
            "Database connection verified"
        );

        self.register_pool_observer();
        self.arm_health_monitor();
        Ok(())
    }

    fn abandon_connect(&self) -> Result<(), DbError> {
        info!("Connection manager closed, abandoning connect");
        self.inner.state.send_replace(ConnectionState::Disconnected);
        Err(DbError::Closed)
    }

    /// Executes a statement through the pool.
    ///
    /// Fails immediately with `NotConnected` unless the manager is Connected.
    /// A connection-class failure starts a self-heal in the background and the
    /// original error is still returned to the caller.
    #[instrument(skip_all, fields(query_id = tracing::field::Empty, param_count = params.len()))]
    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<QueryOutcome<D::Row>, DbError> {
        if self.is_closed() {
            return Err(DbError::Closed);
        }

        let state = self.state();
        if state != ConnectionState::Connected {
            debug!(%state, "Rejecting query, database not connected");
            return Err(DbError::NotConnected { state });
        }

        let query_id = Uuid::new_v4();
        tracing::Span::current().record("query_id", tracing::field::display(query_id));
        let logged_sql = truncate_sql(sql);
        let param_count = params.len();
        debug!(sql = %logged_sql, param_count, "Executing query");

        let started = Instant::now();
        let result = self.inner.driver.execute(sql, params).await;
        let duration = started.elapsed();
        let duration_ms = duration.as_millis() as u64;

        match result {
            Ok(set) => {
                let slow = duration > self.inner.config.slow_query_threshold;
                self.inner.metrics.record_query(duration, slow);

                if slow {
                    warn!(
                        sql = %logged_sql,
                        param_count,
                        duration_ms,
                        row_count = set.row_count,
                        performance = "SLOW",
                        "Query executed"
                    );
                } else {
                    debug!(
                        sql = %logged_sql,
                        param_count,
                        duration_ms,
                        row_count = set.row_count,
                        performance = "OPTIMAL",
                        "Query executed"
                    );
                }

                Ok(QueryOutcome {
                    rows: set.rows,
                    row_count: set.row_count,
                    duration,
                    slow,
                })
            }
            Err(e) => {
                let connection_class = self.inner.classifier.is_connection_error(&e);
                self.inner.metrics.record_query_error(connection_class);
                error!(
                    sql = %logged_sql,
                    param_count,
                    duration_ms,
                    error = %e,
                    connection_class,
                    "Query failed"
                );

                if connection_class {
                    self.begin_healing("query", &e);
                    Err(DbError::Connection(e))
                } else {
                    Err(DbError::Statement(e))
                }
            }
        }
    }

    /// Connected -> Healing, then reconnects in the background.
    /// Does nothing from any other state, so concurrent failures start one heal.
    pub(crate) fn begin_healing(&self, trigger: &'static str, cause: &BackendError) {
        let inner = &self.inner;
        let started = inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected && !*inner.shutdown.borrow() {
                *state = ConnectionState::Healing;
                true
            } else {
                false
            }
        });

        if !started {
            debug!(trigger, "Self-heal already running or manager not connected");
            return;
        }

        warn!(trigger, cause = %cause, "Connection lost, starting self-heal");
        inner.metrics.record_heal(trigger);

        let manager = self.clone();
        tokio::spawn(async move {
            if manager.connect().await {
                info!("Self-heal completed, database connection restored");
            } else {
                error!("Self-heal failed, database is unavailable");
            }
        });
    }

    /// Subscribes to pool events. Keeps the existing observer when one is running.
    fn register_pool_observer(&self) {
        let mut slot = lock(&self.inner.pool_observer);
        if self.is_closed() || slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let events = self.inner.driver.subscribe();
        let weak = Arc::downgrade(&self.inner);
        *slot = Some(tokio::spawn(observe_pool_events(weak, events)));
        debug!("Pool event observer registered");
    }

    /// Starts the recurring health check. Keeps the existing timer when one is running.
    fn arm_health_monitor(&self) {
        let mut slot = lock(&self.inner.health_monitor);
        if self.is_closed() || slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let period = self.inner.config.health_check_interval;
        let weak = Arc::downgrade(&self.inner);
        *slot = Some(tokio::spawn(run_health_monitor(weak, period)));
        info!(interval_ms = period.as_millis() as u64, "Health monitor armed");
    }

    /// Stops the health monitor and pool observer, then releases the pool.
    ///
    /// Idempotent and safe from any state. A connect sequence in progress is
    /// interrupted and ends with `DbError::Closed`.
    pub async fn close(&self) {
        let already_closed = self.inner.shutdown.send_replace(true);

        let monitor = lock(&self.inner.health_monitor).take();
        let observer = lock(&self.inner.pool_observer).take();
        for handle in [monitor, observer].into_iter().flatten() {
            handle.abort();
            // Cancelled is the expected outcome
            let _ = handle.await;
        }

        self.inner.state.send_replace(ConnectionState::Disconnected);
        self.inner.driver.close().await;

        if !already_closed {
            info!("Database connection manager closed");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Attempt number of the running connect sequence, 0 once connected
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn health_monitor_active(&self) -> bool {
        lock(&self.inner.health_monitor)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn occupancy(&self) -> PoolOccupancy {
        self.inner.driver.occupancy()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Resolves once the manager is Disconnected (failed heal, exhausted retries or close)
    pub async fn disconnected(&self) {
        let mut changes = self.inner.state.subscribe();
        let _ = changes
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await;
    }
}

async fn observe_pool_events<D: PoolDriver>(inner: Weak<Inner<D>>, mut events: broadcast::Receiver<PoolEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Pool event observer lagged behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(manager) = ResilientConnectionManager::upgrade(&inner) else {
            break;
        };

        match event {
            PoolEvent::Connected => debug!("New pooled connection established"),
            PoolEvent::Error(message) => {
                error!(error = %message, "Unexpected pool error");
                manager.begin_healing("pool_event", &BackendError::other(message));
            }
        }
    }
    debug!("Pool event observer stopped");
}

fn lock(slot: &Mutex<Option<JoinHandle<()>>>) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// SQL as written to logs, cut at `LOGGED_SQL_MAX_CHARS` characters
/// The last three attempts of a sequence are logged at error level
fn is_final_stretch(attempt: u32, max_attempts: u32) -> bool {
    attempt + 2 >= max_attempts
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(LOGGED_SQL_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &sql[..cut]),
        None => sql.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_stretch_covers_last_three_attempts() {
        let loud: Vec<u32> = (1..=10).filter(|&a| is_final_stretch(a, 10)).collect();
        assert_eq!(loud, vec![8, 9, 10]);

        assert!(is_final_stretch(1, 1));
        assert!(is_final_stretch(1, 3));
        assert!(!is_final_stretch(1, 4));
    }

    #[test]
    fn test_truncate_sql_short_statement() {
        assert_eq!(truncate_sql("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_truncate_sql_long_statement() {
        let sql = format!("SELECT {} FROM t", "a, ".repeat(60));
        let logged = truncate_sql(&sql);

        assert!(logged.ends_with("..."));
        assert_eq!(logged.chars().count(), LOGGED_SQL_MAX_CHARS + 3);
    }

    #[test]
    fn test_truncate_sql_respects_char_boundaries() {
        let sql = "é".repeat(LOGGED_SQL_MAX_CHARS + 5);
        let logged = truncate_sql(&sql);
        assert_eq!(logged.chars().count(), LOGGED_SQL_MAX_CHARS + 3);
    }

    #[tokio::test]
    async fn test_postgres_manager_starts_disconnected() {
        let manager = ResilientConnectionManager::postgres(ConnectionConfig::default().set_port(1));

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.attempts(), 0);
        assert!(!manager.health_monitor_active());
        assert!(matches!(
            manager.query("SELECT 1", Vec::new()).await,
            Err(DbError::NotConnected {
                state: ConnectionState::Disconnected
            })
        ));

        manager.close().await;
        assert!(manager.is_closed());
        assert!(matches!(manager.try_connect().await, Err(DbError::Closed)));
    }
}
