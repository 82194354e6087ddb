//! HTTP routes for the Floor Controller.
//!
//! Defines the Axum router and application state.

use crate::actors::FloorControllerActorHandle;
use crate::errors::FcError;
use crate::floor::FloorState;
use crate::observability::{health_router, HealthState};
use crate::transport::websocket::ws_handler;
use crate::transport::ConnectionRegistry;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: FloorControllerActorHandle,
    /// Session transport shared with every room coordinator.
    pub registry: Arc<ConnectionRegistry>,
    /// Priority weight for sessions that do not pass `priority`.
    pub default_priority: u8,
}

/// Build the application routes.
///
/// - `GET /rooms/:room_id/ws` - WebSocket session
/// - `GET /rooms/:room_id/floor` - current `FloorState` as JSON
/// - `/health`, `/ready` - probes
/// - `/metrics` - Prometheus exposition (when a handle is given)
pub fn build_routes(
    state: Arc<AppState>,
    health: Arc<HealthState>,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let rooms = Router::new()
        .route("/rooms/:room_id/ws", get(ws_handler))
        .route("/rooms/:room_id/floor", get(floor_state_handler))
        .with_state(state);

    let mut app = rooms.merge(health_router(health));

    if let Some(handle) = metrics {
        app = app.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    app.layer(TraceLayer::new_for_http())
}

async fn floor_state_handler(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<FloorState>, FcError> {
    let room = state.controller.get_room(room_id).await?;
    Ok(Json(room.floor_state()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
