use std::process::ExitCode;

use reputation_shield_backend::{
    config::Settings,
    datalayer::ResilientConnectionManager,
    logging::{init_telemetry, shutdown_telemetry},
    routes::create_router,
    state::AppState,
};
use tokio::sync::oneshot;

/// Why the HTTP server stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownReason {
    Signal,
    DatabaseLost,
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            // Telemetry is configured from these settings, so stderr is all we have
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_telemetry(Some(settings.telemetry.clone())) {
        eprintln!("Failed to initialize telemetry: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!("Starting Reputation Shield backend");

    let code = run(settings).await;

    // Shutdown telemetry gracefully
    shutdown_telemetry();
    code
}

async fn run(settings: Settings) -> ExitCode {
    let db = ResilientConnectionManager::postgres(settings.database);

    if let Err(e) = db.try_connect().await {
        tracing::error!(error = %e, "Database unavailable at startup, shutting down");
        db.close().await;
        return ExitCode::FAILURE;
    }

    tracing::info!("Database initialized successfully");

    let app = create_router(AppState::new(db.clone()));

    let addr = settings.server.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to bind listener");
            db.close().await;
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        address = %addr,
        "Server listening and ready to accept connections"
    );

    tracing::info!(
        endpoints = ?vec![
            "/health - database health report",
            "/health/live - liveness probe",
            "/health/ready - readiness probe",
        ],
        "Available API endpoints"
    );

    let (reason_tx, reason_rx) = oneshot::channel();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_trigger(db.clone(), reason_tx))
        .await;

    db.close().await;

    if let Err(e) = served {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    match reason_rx.await {
        Ok(ShutdownReason::DatabaseLost) => {
            tracing::error!("Stopped after losing the database connection");
            ExitCode::FAILURE
        }
        _ => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
    }
}

/// Resolves on SIGINT/SIGTERM, or once a failed self-heal leaves the database disconnected
async fn shutdown_trigger(db: ResilientConnectionManager, reason: oneshot::Sender<ShutdownReason>) {
    let cause = tokio::select! {
        _ = shutdown_signal() => ShutdownReason::Signal,
        _ = db.disconnected() => ShutdownReason::DatabaseLost,
    };

    if cause == ShutdownReason::DatabaseLost {
        tracing::error!("Database connection could not be restored, shutting down");
    }

    let _ = reason.send(cause);
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::warn!("Shutdown signal received, cleaning up...");
}
