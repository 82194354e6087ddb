//! Floor Controller error types.
//!
//! Error types map to wire `ErrorCode` strings for client responses.
//! Internal details are logged server-side but not exposed to clients.

use crate::floor::FloorPhase;
use crate::protocol::ServerReply;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Floor Controller error type.
///
/// Maps to wire error codes:
/// - `FloorConflict`: `FLOOR_CONFLICT`
/// - `NotFloorHolder`: `NOT_FLOOR_HOLDER`
/// - `QueueFull`, `NotQueued`: `FLOOR_DENIED`
/// - `InvalidPriority`, `InvalidTransition`, `InvalidRequest`: `INVALID_REQUEST`
/// - `RoomNotFound`: `ROOM_NOT_FOUND`
/// - `RoomCapacityExceeded`, `Draining`: `ROOM_FULL`
/// - `Internal`, `Config`: `INTERNAL_ERROR`
#[derive(Debug, Error)]
pub enum FcError {
    /// The participant already holds the floor and requested it again.
    #[error("Participant already holds the floor: {0}")]
    FloorConflict(String),

    /// Release or holder-only operation from a participant who does not hold the floor.
    #[error("Participant does not hold the floor: {0}")]
    NotFloorHolder(String),

    /// Cancel from a participant with no queued request.
    #[error("Participant has no queued floor request: {0}")]
    NotQueued(String),

    /// The room's floor queue is at capacity.
    #[error("Floor queue is full (max {max})")]
    QueueFull { max: usize },

    /// Requested priority lies outside the configured range.
    #[error("Priority {priority} outside allowed range {min}..={max}")]
    InvalidPriority { priority: u8, min: u8, max: u8 },

    /// Requested phase change is not allowed from the current phase.
    #[error("Invalid floor transition: {from} -> {to}")]
    InvalidTransition { from: FloorPhase, to: FloorPhase },

    /// Malformed client request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Room not found.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Controller is at its room capacity.
    #[error("Room capacity exceeded (max {max})")]
    RoomCapacityExceeded { max: usize },

    /// Controller is draining (graceful shutdown).
    #[error("Floor controller is draining")]
    Draining,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (actor channel failure, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FcError {
    /// Returns the wire error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            FcError::FloorConflict(_) => "FLOOR_CONFLICT",
            FcError::NotFloorHolder(_) => "NOT_FLOOR_HOLDER",
            FcError::NotQueued(_) | FcError::QueueFull { .. } => "FLOOR_DENIED",
            FcError::InvalidPriority { .. }
            | FcError::InvalidTransition { .. }
            | FcError::InvalidRequest(_) => "INVALID_REQUEST",
            FcError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            FcError::RoomCapacityExceeded { .. } | FcError::Draining => "ROOM_FULL",
            FcError::Config(_) | FcError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a caller may reasonably retry the operation unchanged later.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            FcError::QueueFull { .. }
                | FcError::RoomCapacityExceeded { .. }
                | FcError::Draining
                | FcError::Internal(_)
        )
    }

    /// HTTP status for the REST surface.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            FcError::FloorConflict(_) | FcError::InvalidTransition { .. } => StatusCode::CONFLICT,
            FcError::NotFloorHolder(_) => StatusCode::FORBIDDEN,
            FcError::NotQueued(_) | FcError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            FcError::QueueFull { .. } | FcError::RoomCapacityExceeded { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            FcError::InvalidPriority { .. } | FcError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            FcError::Draining => StatusCode::SERVICE_UNAVAILABLE,
            FcError::Config(_) | FcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            FcError::Config(_) | FcError::Internal(_) => "An internal error occurred".to_string(),
            FcError::FloorConflict(_) => "You already hold the floor".to_string(),
            FcError::NotFloorHolder(_) => "You do not hold the floor".to_string(),
            FcError::NotQueued(_) => "You have no pending floor request".to_string(),
            FcError::RoomNotFound(_) => "Room not found".to_string(),
            FcError::Draining => "Server is shutting down, please reconnect".to_string(),
            FcError::QueueFull { .. }
            | FcError::InvalidPriority { .. }
            | FcError::InvalidTransition { .. }
            | FcError::InvalidRequest(_)
            | FcError::RoomCapacityExceeded { .. } => self.to_string(),
        }
    }
}

impl IntoResponse for FcError {
    fn into_response(self) -> Response {
        if let FcError::Internal(detail) | FcError::Config(detail) = &self {
            // Log actual error server-side, return generic message to client
            tracing::error!(target: "fc.http", error = %detail, "Request failed");
        }
        (self.status_code(), Json(ServerReply::from(&self))).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            FcError::FloorConflict("p1".to_string()).error_code(),
            "FLOOR_CONFLICT"
        );
        assert_eq!(
            FcError::NotFloorHolder("p1".to_string()).error_code(),
            "NOT_FLOOR_HOLDER"
        );
        assert_eq!(FcError::QueueFull { max: 4 }.error_code(), "FLOOR_DENIED");
        assert_eq!(
            FcError::NotQueued("p1".to_string()).error_code(),
            "FLOOR_DENIED"
        );
        assert_eq!(
            FcError::InvalidPriority {
                priority: 42,
                min: 0,
                max: 10
            }
            .error_code(),
            "INVALID_REQUEST"
        );
        assert_eq!(
            FcError::InvalidTransition {
                from: FloorPhase::Idle,
                to: FloorPhase::Speaking
            }
            .error_code(),
            "INVALID_REQUEST"
        );
        assert_eq!(
            FcError::RoomNotFound("room-1".to_string()).error_code(),
            "ROOM_NOT_FOUND"
        );
        assert_eq!(
            FcError::RoomCapacityExceeded { max: 1 }.error_code(),
            "ROOM_FULL"
        );
        assert_eq!(FcError::Draining.error_code(), "ROOM_FULL");
        assert_eq!(
            FcError::Internal("closed".to_string()).error_code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_floor_errors_are_not_retryable() {
        assert!(!FcError::FloorConflict("p1".to_string()).retryable());
        assert!(!FcError::NotFloorHolder("p1".to_string()).retryable());
        assert!(FcError::QueueFull { max: 4 }.retryable());
        assert!(FcError::Draining.retryable());
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = FcError::Internal("channel send failed: receiver dropped".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = FcError::Config("bad FC_PRIORITY_MAX".to_string());
        assert!(!err.client_message().contains("FC_PRIORITY_MAX"));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                FcError::InvalidTransition {
                    from: FloorPhase::Cooldown,
                    to: FloorPhase::Speaking
                }
            ),
            "Invalid floor transition: cooldown -> speaking"
        );
        assert_eq!(
            format!(
                "{}",
                FcError::InvalidPriority {
                    priority: 11,
                    min: 0,
                    max: 10
                }
            ),
            "Priority 11 outside allowed range 0..=10"
        );
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            FcError::RoomNotFound("r".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(FcError::Draining.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            FcError::InvalidRequest("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
