//! Floor Controller
//!
//! Serves floor control for real-time rooms over WebSocket.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (plain or JSON)
//! 3. Initialize Prometheus metrics recorder
//! 4. Spawn the `FloorControllerActor`
//! 5. Bind the HTTP server (sessions, floor state, health, metrics)
//! 6. Wait for shutdown signal, then drain rooms

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use floor_controller::actors::{ActorMetrics, FloorControllerActorHandle};
use floor_controller::config::Config;
use floor_controller::observability::metrics::init_metrics_recorder;
use floor_controller::observability::HealthState;
use floor_controller::routes::{build_routes, AppState};
use floor_controller::transport::{ConnectionRegistry, SessionTransport};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration comes first so FC_LOG_JSON can pick the log format.
    let config = Config::from_env()?;

    init_tracing(config.log_json);

    info!("Starting Floor Controller");
    info!(
        instance_id = %config.instance_id,
        http_bind_address = %config.http_bind_address,
        max_rooms = config.max_rooms,
        max_duration_ms = u64::try_from(config.floor.max_duration.as_millis()).unwrap_or(u64::MAX),
        cooldown_ms = u64::try_from(config.floor.cooldown.as_millis()).unwrap_or(u64::MAX),
        activity_timeout_ms =
            u64::try_from(config.floor.activity_timeout.as_millis()).unwrap_or(u64::MAX),
        priority_min = config.floor.priority_min,
        priority_max = config.floor.priority_max,
        max_queue_length = config.floor.max_queue_length,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    info!("Initializing actor system...");
    let registry = Arc::new(ConnectionRegistry::new());
    let transport: Arc<dyn SessionTransport> = registry.clone();
    let controller = FloorControllerActorHandle::new(
        config.instance_id.clone(),
        config.floor,
        config.max_rooms,
        transport,
        ActorMetrics::new(),
    );
    info!("Actor system initialized");

    let state = Arc::new(AppState {
        controller: controller.clone(),
        registry,
        default_priority: config.floor.default_priority,
    });
    let app = build_routes(state, Arc::clone(&health_state), Some(prometheus_handle));

    let addr: SocketAddr = config.http_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.http_bind_address, "Invalid HTTP bind address");
        format!("Invalid HTTP bind address: {e}")
    })?;

    // Bind BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind HTTP server");
        format!("Failed to bind HTTP server to {addr}: {e}")
    })?;

    let server_token = CancellationToken::new();
    let server_shutdown = server_token.clone();
    let server = tokio::spawn(async move {
        info!(addr = %addr, "HTTP server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_shutdown.cancelled().await;
            info!("HTTP server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server failed");
        }
    });

    health_state.set_ready();
    info!("Floor Controller running - press Ctrl+C to shutdown");

    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Not ready first so load balancers stop sending sessions
    health_state.set_not_ready();

    // Rooms close before the sockets do
    if let Err(e) = controller.shutdown(config.shutdown_timeout).await {
        warn!(error = %e, "Actor system shutdown error");
    }

    server_token.cancel();
    if tokio::time::timeout(config.shutdown_timeout, server).await.is_err() {
        warn!("HTTP server did not stop before the shutdown deadline");
    }

    info!("Floor Controller shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "floor_controller=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
