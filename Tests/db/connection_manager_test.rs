#[path = "../common/mod.rs"]
mod common;

use common::{FakeDriver, refused, test_config, wait_until};
use mockall::mock;
use reputation_shield_backend::datalayer::db_ops::classifier::ErrorClassifier;
use reputation_shield_backend::datalayer::db_ops::constants::{
    ConnectionState, HEALTH_PROBE, HealthStatus, PoolEvent, RowSet,
};
use reputation_shield_backend::datalayer::db_ops::db_ops::ResilientConnectionManager;
use reputation_shield_backend::datalayer::helper::backoff::ExponentialBackoff;
use reputation_shield_backend::errors::{BackendError, DbError};
use sea_query::Value;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

mock! {
    pub Classifier {}

    impl ErrorClassifier for Classifier {
        fn is_connection_error(&self, error: &BackendError) -> bool;
    }
}

fn manager(max_retries: u32) -> (ResilientConnectionManager<FakeDriver>, FakeDriver) {
    let driver = FakeDriver::new();
    let manager = ResilientConnectionManager::new(test_config(max_retries), driver.clone());
    (manager, driver)
}

// ---- connect ----

#[tokio::test(start_paused = true)]
async fn test_connect_exhausts_retries() {
    let (manager, driver) = manager(3);
    driver.fail_verify(3, refused());

    let err = assert_err!(manager.try_connect().await);

    match err {
        DbError::ExhaustedRetries { attempts, last_error } => {
            assert_eq!(attempts, 3);
            assert_eq!(last_error.code(), Some("ECONNREFUSED"));
        }
        other => panic!("expected ExhaustedRetries, got {:?}", other),
    }
    assert_eq!(driver.verify_calls(), 3);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.health_monitor_active());
    assert!(err_is_unavailable(&manager).await);
}

async fn err_is_unavailable(manager: &ResilientConnectionManager<FakeDriver>) -> bool {
    manager
        .query("SELECT 1", Vec::new())
        .await
        .err()
        .is_some_and(|e| e.is_unavailable())
}

#[tokio::test(start_paused = true)]
async fn test_connect_returns_false_after_exhausting_retries() {
    let (manager, driver) = manager(3);
    driver.fail_verify(3, refused());

    assert!(!manager.connect().await);
    assert_eq!(driver.verify_calls(), 3);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_stay_within_bounds() {
    let (manager, driver) = manager(3);
    driver.fail_verify(3, refused());
    let backoff = ExponentialBackoff::from_config(manager.config());

    let started = Instant::now();
    assert!(!manager.connect().await);
    let elapsed = started.elapsed();

    // Two sleeps: after attempt 1 and after attempt 2
    let lower = backoff.lower_bound(1) + backoff.lower_bound(2);
    let upper = backoff.upper_bound(1) + backoff.upper_bound(2);
    assert!(elapsed >= lower, "elapsed {:?} below {:?}", elapsed, lower);
    assert!(elapsed <= upper, "elapsed {:?} above {:?}", elapsed, upper);
}

#[tokio::test(start_paused = true)]
async fn test_connect_succeeds_on_second_attempt() {
    let (manager, driver) = manager(5);
    driver.fail_verify(1, refused());

    assert!(manager.connect().await);

    assert_eq!(driver.verify_calls(), 2);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.attempts(), 0);
    assert!(manager.health_monitor_active());

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_connected_is_noop() {
    let (manager, driver) = manager(5);

    assert_ok!(manager.try_connect().await);
    assert_ok!(manager.try_connect().await);

    assert_eq!(driver.verify_calls(), 1);
    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connect_runs_one_sequence() {
    let (manager, driver) = manager(5);
    driver.set_verify_delay(Duration::from_millis(100));

    let (first, second) = tokio::join!(manager.connect(), manager.connect());

    assert!(first);
    assert!(second);
    assert_eq!(driver.verify_calls(), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connect_shares_failure() {
    let (manager, driver) = manager(2);
    driver.fail_verify(2, refused());

    let (first, second) = tokio::join!(manager.try_connect(), manager.try_connect());

    assert!(matches!(first, Err(DbError::ExhaustedRetries { attempts: 2, .. })));
    assert!(matches!(
        second,
        Err(DbError::NotConnected {
            state: ConnectionState::Disconnected
        })
    ));
    assert_eq!(driver.verify_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_zero_retry_budget_still_attempts_once() {
    let (manager, driver) = manager(0);
    driver.fail_verify(1, refused());

    assert!(matches!(
        manager.try_connect().await,
        Err(DbError::ExhaustedRetries { attempts: 1, .. })
    ));
    assert_eq!(driver.verify_calls(), 1);
}

// ---- query ----

#[tokio::test(start_paused = true)]
async fn test_query_while_disconnected_fails_fast() {
    let (manager, driver) = manager(3);

    let err = assert_err!(manager.query("SELECT * FROM users", Vec::new()).await);

    assert!(matches!(
        err,
        DbError::NotConnected {
            state: ConnectionState::Disconnected
        }
    ));
    assert_eq!(driver.verify_calls(), 0);
    assert!(driver.executed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_query_returns_rows_and_count() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);

    driver.push_execute(Ok(RowSet::new(
        vec![json!({ "id": 1 }), json!({ "id": 2 })],
        0,
    )));
    let outcome = assert_ok!(
        manager
            .query(
                "SELECT id FROM businesses WHERE owner_id = $1 AND active = $2",
                vec![Value::Int(Some(7)), Value::Bool(Some(true))],
            )
            .await
    );

    assert_eq!(outcome.row_count, 2);
    assert_eq!(outcome.rows[1]["id"], 2);
    assert!(!outcome.slow);
    assert_eq!(
        driver.executed(),
        vec![(
            "SELECT id FROM businesses WHERE owner_id = $1 AND active = $2".to_string(),
            2
        )]
    );

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_update_reports_rows_affected() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);

    driver.push_execute(Ok(RowSet::new(Vec::new(), 4)));
    let outcome = assert_ok!(
        manager
            .query("UPDATE inquiries SET status = 'closed'", Vec::new())
            .await
    );

    assert_eq!(outcome.row_count, 4);
    assert!(outcome.rows.is_empty());
    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_query_is_flagged_not_failed() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);

    driver.set_execute_delay(Duration::from_millis(1500));
    let outcome = assert_ok!(manager.query("SELECT pg_sleep(1.5)", Vec::new()).await);

    assert!(outcome.slow);
    assert!(outcome.duration >= Duration::from_millis(1500));
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_connection_error_starts_self_heal() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);
    let mut changes = manager.state_changes();

    driver.push_execute(Err(BackendError::database(
        "57P01",
        "terminating connection due to administrator command",
    )));
    let err = assert_err!(manager.query("SELECT 1", Vec::new()).await);

    // The caller still sees the original failure
    match &err {
        DbError::Connection(backend) => assert_eq!(backend.code(), Some("57P01")),
        other => panic!("expected Connection, got {:?}", other),
    }
    // Healing is entered before query() returns, reconnect runs in the background
    assert_eq!(manager.state(), ConnectionState::Healing);

    changes
        .wait_for(|state| *state == ConnectionState::Connected)
        .await
        .unwrap();
    assert_eq!(driver.verify_calls(), 2);

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_statement_error_does_not_heal() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);

    driver.push_execute(Err(BackendError::database(
        "23505",
        "duplicate key value violates unique constraint \"users_email_key\"",
    )));
    let err = assert_err!(
        manager
            .query(
                "INSERT INTO users (email) VALUES ($1)",
                vec![Value::String(Some(Box::new("a@b.c".to_string())))],
            )
            .await
    );

    assert!(matches!(err, DbError::Statement(_)));
    assert!(!err.is_unavailable());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(driver.verify_calls(), 1);

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_heal_ends_disconnected() {
    let (manager, driver) = manager(2);
    assert!(manager.connect().await);

    driver.fail_verify(2, refused());
    driver.push_execute(Err(refused()));
    assert_err!(manager.query("SELECT 1", Vec::new()).await);

    manager.disconnected().await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(driver.verify_calls(), 3);
    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_injected_classifier_overrides_default() {
    let driver = FakeDriver::new();
    let mut classifier = MockClassifier::new();
    classifier
        .expect_is_connection_error()
        .withf(|error: &BackendError| error.code() == Some("40001"))
        .times(1)
        .returning(|_| true);

    let manager = ResilientConnectionManager::with_classifier(test_config(3), driver.clone(), classifier);
    assert!(manager.connect().await);

    driver.push_execute(Err(BackendError::database("40001", "could not serialize access")));
    let err = assert_err!(manager.query("SELECT 1", Vec::new()).await);

    assert!(matches!(err, DbError::Connection(_)));
    wait_until(|| driver.verify_calls() == 2).await;

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_closure_classifier() {
    let driver = FakeDriver::new();
    let manager = ResilientConnectionManager::with_classifier(
        test_config(3),
        driver.clone(),
        |_: &BackendError| false,
    );
    assert!(manager.connect().await);

    // Transport failure, but this classifier never heals
    driver.push_execute(Err(refused()));
    let err = assert_err!(manager.query("SELECT 1", Vec::new()).await);

    assert!(matches!(err, DbError::Statement(_)));
    assert_eq!(manager.state(), ConnectionState::Connected);
    manager.close().await;
}

// ---- pool events ----

#[tokio::test(start_paused = true)]
async fn test_pool_error_event_starts_self_heal() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);

    assert_eq!(driver.emit(PoolEvent::Connected), 1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(driver.verify_calls(), 1);

    driver.emit(PoolEvent::Error("server closed the connection unexpectedly".to_string()));
    wait_until(|| driver.verify_calls() == 2).await;
    wait_until(|| manager.state() == ConnectionState::Connected).await;

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_heal_keeps_a_single_pool_observer() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);

    driver.push_execute(Err(refused()));
    assert_err!(manager.query("SELECT 1", Vec::new()).await);
    wait_until(|| manager.state() == ConnectionState::Connected).await;
    assert_eq!(driver.verify_calls(), 2);

    assert_eq!(driver.emit(PoolEvent::Connected), 1);

    manager.close().await;
}

// ---- health ----

#[tokio::test(start_paused = true)]
async fn test_health_check_reports_disconnected_as_unhealthy() {
    let (manager, driver) = manager(3);

    let report = manager.health_check().await;

    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert!(report.error.unwrap().contains("not connected"));
    assert!(report.connections.is_none());
    assert_eq!(driver.verify_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_health_check_never_fails() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);

    let healthy = manager.health_check().await;
    assert!(healthy.is_healthy());
    assert_eq!(healthy.connections.unwrap().total, 1);

    driver.push_execute(Err(BackendError::database("42P01", "relation does not exist")));
    let unhealthy = manager.health_check().await;
    assert_eq!(unhealthy.status, HealthStatus::Unhealthy);
    assert!(unhealthy.error.unwrap().contains("42P01"));

    let probes: Vec<String> = driver.executed().into_iter().map(|(sql, _)| sql).collect();
    assert_eq!(probes, vec![HEALTH_PROBE.to_string(), HEALTH_PROBE.to_string()]);

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_health_monitor_fires_on_interval() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(driver.executed().is_empty());

    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert_eq!(driver.executed().len(), 1);
    assert_eq!(driver.executed()[0].0, HEALTH_PROBE);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(driver.executed().len(), 2);

    manager.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_heal_keeps_a_single_health_timer() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);

    driver.push_execute(Err(refused()));
    assert_err!(manager.query("SELECT 1", Vec::new()).await);
    wait_until(|| manager.state() == ConnectionState::Connected).await;

    let health_probes = || {
        driver
            .executed()
            .into_iter()
            .filter(|(sql, _)| sql == HEALTH_PROBE)
            .count()
    };

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(health_probes(), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(health_probes(), 2);

    manager.close().await;
}

// ---- close ----

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent() {
    let (manager, driver) = manager(3);

    // From Disconnected
    manager.close().await;
    manager.close().await;

    assert!(manager.is_closed());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.health_monitor_active());
    assert!(driver.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_close_from_connected_stops_timer() {
    let (manager, driver) = manager(3);
    assert!(manager.connect().await);
    assert!(manager.health_monitor_active());

    manager.close().await;
    manager.close().await;

    assert!(!manager.health_monitor_active());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(driver.is_closed());

    // No probe after close, even past the interval
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert!(driver.executed().is_empty());

    assert!(matches!(
        manager.query("SELECT 1", Vec::new()).await,
        Err(DbError::Closed)
    ));
    assert!(matches!(manager.try_connect().await, Err(DbError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn test_close_interrupts_backoff() {
    let (manager, driver) = manager(5);
    driver.fail_verify(5, refused());

    let connecting = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.try_connect().await })
    };

    wait_until(|| driver.verify_calls() == 1).await;
    manager.close().await;

    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(DbError::Closed)));
    assert_eq!(driver.verify_calls(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_close_during_last_attempt_wins_over_exhaustion() {
    let (manager, driver) = manager(1);
    driver.fail_verify(1, refused());
    driver.set_verify_delay(Duration::from_secs(1));

    let connecting = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.try_connect().await })
    };

    wait_until(|| driver.verify_calls() == 1).await;
    manager.close().await;

    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(DbError::Closed)));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}
