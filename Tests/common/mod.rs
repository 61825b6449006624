#![allow(dead_code)]

use async_trait::async_trait;
use reputation_shield_backend::datalayer::db_ops::connection_pool::PoolDriver;
use reputation_shield_backend::datalayer::db_ops::constants::{
    ConnectionConfig, PoolEvent, PoolOccupancy, RowSet,
};
use reputation_shield_backend::errors::BackendError;
use sea_query::Value;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const FAKE_SERVER_VERSION: &str = "PostgreSQL 16.2 (fake)";

/// In-memory pool driver with scripted outcomes.
///
/// Verify and execute results are popped from queues; an empty queue means success.
/// Clones share state, so a test can keep one handle while the manager owns another.
#[derive(Clone)]
pub struct FakeDriver {
    state: Arc<FakeState>,
}

struct FakeState {
    verify_results: Mutex<VecDeque<Result<Option<String>, BackendError>>>,
    verify_delay: Mutex<Duration>,
    verify_calls: AtomicU32,
    execute_results: Mutex<VecDeque<Result<RowSet<serde_json::Value>, BackendError>>>,
    execute_delay: Mutex<Duration>,
    executed: Mutex<Vec<(String, usize)>>,
    occupancy: Mutex<PoolOccupancy>,
    closed: AtomicBool,
    close_calls: AtomicU32,
    events: broadcast::Sender<PoolEvent>,
}

impl FakeDriver {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Arc::new(FakeState {
                verify_results: Mutex::new(VecDeque::new()),
                verify_delay: Mutex::new(Duration::ZERO),
                verify_calls: AtomicU32::new(0),
                execute_results: Mutex::new(VecDeque::new()),
                execute_delay: Mutex::new(Duration::ZERO),
                executed: Mutex::new(Vec::new()),
                occupancy: Mutex::new(PoolOccupancy {
                    total: 1,
                    idle: 1,
                    waiting: 0,
                }),
                closed: AtomicBool::new(false),
                close_calls: AtomicU32::new(0),
                events,
            }),
        }
    }

    /// Queues `times` failed verifications
    pub fn fail_verify(&self, times: usize, error: BackendError) {
        let mut results = self.state.verify_results.lock().unwrap();
        for _ in 0..times {
            results.push_back(Err(error.clone()));
        }
    }

    pub fn push_execute(&self, result: Result<RowSet<serde_json::Value>, BackendError>) {
        self.state.execute_results.lock().unwrap().push_back(result);
    }

    pub fn set_verify_delay(&self, delay: Duration) {
        *self.state.verify_delay.lock().unwrap() = delay;
    }

    pub fn set_execute_delay(&self, delay: Duration) {
        *self.state.execute_delay.lock().unwrap() = delay;
    }

    pub fn verify_calls(&self) -> u32 {
        self.state.verify_calls.load(Ordering::SeqCst)
    }

    /// SQL text and parameter count of every executed statement
    pub fn executed(&self) -> Vec<(String, usize)> {
        self.state.executed.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    pub fn emit(&self, event: PoolEvent) -> usize {
        self.state.events.send(event).unwrap_or(0)
    }
}

#[async_trait]
impl PoolDriver for FakeDriver {
    type Row = serde_json::Value;

    async fn verify(&self, _probes: &[&str]) -> Result<Option<String>, BackendError> {
        self.state.verify_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.verify_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.state.verify_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Some(FAKE_SERVER_VERSION.to_string())))
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<RowSet<serde_json::Value>, BackendError> {
        self.state
            .executed
            .lock()
            .unwrap()
            .push((sql.to_string(), params.len()));

        let delay = *self.state.execute_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.state.execute_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(RowSet::new(vec![json!({ "ok": 1 })], 0)))
    }

    fn occupancy(&self) -> PoolOccupancy {
        *self.state.occupancy.lock().unwrap()
    }

    fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.state.events.subscribe()
    }

    async fn close(&self) {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// Config with the default retry policy and a small retry budget
pub fn test_config(max_retries: u32) -> ConnectionConfig {
    ConnectionConfig::default()
        .set_host("db.test".to_string())
        .set_database("reputation_management".to_string())
        .set_user("tester".to_string())
        .set_password("secret".to_string())
        .set_max_retries(max_retries)
}

pub fn refused() -> BackendError {
    BackendError::transport(Some("ECONNREFUSED"), "connection refused")
}

/// Polls `condition` on the (paused) clock until it holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
