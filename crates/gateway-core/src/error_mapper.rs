//! Error Mapper (spec §4.10): the single place a [`GatewayError`] crosses
//! into the external HTTP response format. Always sets the correlation-id
//! response header, logs at WARN for 4xx and ERROR for 5xx, and never
//! logs token contents or session secrets.

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;

use crate::error::{ErrorBody, GatewayError};
use crate::headers::CORRELATION_ID_HEADER;
use crate::telemetry::log::{current_correlation_id, current_route_context};

/// Stamped onto every error response so the Metrics Filter can label the
/// errors counter without re-deriving the kind from the status code
/// (spec §4.8's `error_kind` label).
#[derive(Clone, Copy, Debug)]
pub struct ErrorKindExt(pub &'static str);

impl IntoResponse for GatewayError {
	fn into_response(self) -> Response {
		let (status, code) = self.status_and_code();
		let correlation_id = current_correlation_id().unwrap_or_default();
		let (route_id, path) = current_route_context().unwrap_or_default();

		if self.is_client_fault() {
			tracing::warn!(
				correlation_id = %correlation_id,
				route_id = %route_id,
				path = %path,
				code = code,
				reason = %self,
				"request rejected"
			);
		} else {
			tracing::error!(
				correlation_id = %correlation_id,
				route_id = %route_id,
				path = %path,
				code = code,
				reason = %self,
				"unexpected gateway failure"
			);
		}

		let message = match &self {
			// Internal detail never reaches the client; the taxonomy code
			// and reason phrase are all a caller is entitled to (spec §7).
			GatewayError::Internal(_) => "an internal error occurred".to_string(),
			other => other.to_string(),
		};

		let body = ErrorBody {
			timestamp: chrono::Utc::now().to_rfc3339(),
			status: status.as_u16(),
			error: status
				.canonical_reason()
				.unwrap_or("Error")
				.to_string(),
			code,
			message,
			correlation_id: correlation_id.clone(),
		};

		let mut response = (status, Json(body)).into_response();
		if let Ok(value) = correlation_id.parse() {
			response.headers_mut().insert(&*CORRELATION_ID_HEADER, value);
		}
		response.extensions_mut().insert(ErrorKindExt(code));
		response
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn internal_errors_hide_detail_from_client() {
		let response = GatewayError::Internal("db connection string leaked".to_string()).into_response();
		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	}

	#[test]
	fn breaker_open_maps_to_policy_specific_kind() {
		let response = GatewayError::breaker_open("redis").into_response();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}
}
