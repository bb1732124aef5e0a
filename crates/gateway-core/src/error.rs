//! Stable error taxonomy for the gateway's request pipeline.
//!
//! Every component in the pipeline returns either success or one of these
//! kinds; [`error_mapper`](crate::error_mapper) is the only place a kind is
//! turned into an HTTP response.

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Internal failure kinds recognized by the pipeline (spec §4.3).
#[derive(Debug, Error)]
pub enum GatewayError {
	/// Missing/malformed header or token, session not found, relationship
	/// missing, partner mismatch, or signature invalid.
	#[error("session invalid: {0}")]
	SessionInvalid(String),

	/// Session-store breaker open, or a read failure against the store.
	#[error("session service unavailable: {0}")]
	SessionServiceUnavailable(String),

	/// Route requires permissions the session does not hold.
	#[error("insufficient permissions")]
	InsufficientPermissions,

	/// Downstream breaker open.
	#[error("downstream unavailable: {0}")]
	DownstreamUnavailable(String),

	/// A breaker tripped under a policy name the mapper does not special-case.
	#[error("circuit breaker '{0}' open")]
	CircuitOpenUnknown(String),

	/// Upstream responded with a status the gateway surfaces unchanged.
	#[error("upstream returned {status}")]
	Upstream { status: StatusCode },

	/// Anything else — logged with full detail, never disclosed to the client.
	#[error("internal error: {0}")]
	Internal(String),
}

impl GatewayError {
	/// Originating circuit-breaker policy name, for breaker-open failures
	/// that should be remapped to a policy-specific kind by the caller.
	pub fn breaker_open(policy: &str) -> GatewayError {
		match policy {
			"redis" => GatewayError::SessionServiceUnavailable(format!(
				"circuit breaker '{policy}' open"
			)),
			"downstream" => {
				GatewayError::DownstreamUnavailable(format!("circuit breaker '{policy}' open"))
			}
			other => GatewayError::CircuitOpenUnknown(other.to_string()),
		}
	}

	/// The stable (status, code) pair for this error kind, per spec §4.3.
	pub fn status_and_code(&self) -> (StatusCode, &'static str) {
		match self {
			GatewayError::SessionInvalid(_) => (StatusCode::UNAUTHORIZED, "INVALID_SESSION"),
			GatewayError::SessionServiceUnavailable(_) => {
				(StatusCode::UNAUTHORIZED, "SESSION_SERVICE_UNAVAILABLE")
			}
			GatewayError::InsufficientPermissions => {
				(StatusCode::FORBIDDEN, "INSUFFICIENT_PERMISSIONS")
			}
			GatewayError::DownstreamUnavailable(_) => (
				StatusCode::SERVICE_UNAVAILABLE,
				"SERVICE_TEMPORARILY_UNAVAILABLE",
			),
			GatewayError::CircuitOpenUnknown(_) => {
				(StatusCode::SERVICE_UNAVAILABLE, "CIRCUIT_BREAKER_OPEN")
			}
			GatewayError::Upstream { status } => (*status, "GATEWAY_ERROR"),
			GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
		}
	}

	/// Whether the Error Mapper should log this at WARN (client-facing,
	/// expected) rather than ERROR (unexpected, operator-facing).
	pub fn is_client_fault(&self) -> bool {
		self.status_and_code().0.as_u16() < 500
	}
}

/// Wire format for every error response the gateway emits (spec §4.3, §6).
#[derive(Debug, Serialize)]
pub struct ErrorBody {
	pub timestamp: String,
	pub status: u16,
	pub error: String,
	pub code: &'static str,
	pub message: String,
	#[serde(rename = "correlationId")]
	pub correlation_id: String,
}
