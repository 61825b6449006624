use chrono::Utc;
use std::sync::Weak;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::datalayer::db_ops::connection_pool::PoolDriver;
use crate::datalayer::db_ops::constants::{HEALTH_PROBE, HealthReport};
use crate::datalayer::db_ops::db_ops::{Inner, ResilientConnectionManager};

impl<D: PoolDriver> ResilientConnectionManager<D> {
    /// Runs a lightweight probe through `query()` and reports the result.
    ///
    /// Never fails: errors come back as an `UNHEALTHY` report. Because the probe
    /// goes through `query()`, a connection-class failure here also starts a
    /// self-heal.
    pub async fn health_check(&self) -> HealthReport {
        let timestamp = Utc::now();
        let started = Instant::now();

        match self.query(HEALTH_PROBE, Vec::new()).await {
            Ok(_) => {
                let report = HealthReport::healthy(timestamp, started.elapsed(), self.occupancy());
                debug!(
                    response_time_ms = report.response_time_ms,
                    connections = ?report.connections,
                    "Database health check passed"
                );
                report
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                HealthReport::unhealthy(timestamp, started.elapsed(), e.to_string())
            }
        }
    }
}

/// Health check timer. First probe fires one full period after arming.
pub(crate) async fn run_health_monitor<D: PoolDriver>(inner: Weak<Inner<D>>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    // A slow probe should not cause a burst of catch-up probes
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(manager) = ResilientConnectionManager::upgrade(&inner) else {
            break;
        };

        let report = manager.health_check().await;
        if report.is_healthy() {
            debug!(response_time_ms = report.response_time_ms, "Periodic health check passed");
        } else {
            warn!(
                error = report.error.as_deref().unwrap_or("unknown"),
                state = %manager.state(),
                "Periodic health check failed"
            );
        }
    }

    info!("Health monitor stopped");
}
