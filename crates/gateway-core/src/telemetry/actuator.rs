//! Actuator surface (spec §6): liveness, readiness, and a Prometheus-text
//! `/metrics` endpoint. The core only defines these names and the
//! `application=<service-name>` common tag; a surrounding host is free to
//! expose them however it likes, but `gateway-app` wires this router up
//! directly since nothing else in this workspace would.
//!
//! Grounded on the teacher's `src/mtrcs.rs` (axum `Router` + `State`,
//! `prometheus_client::encoding::text::encode` into a `String`) and
//! `crates/agentgateway/src/management/readiness_server.rs` for the
//! liveness/readiness split, simplified to axum since this generation of
//! the teacher already uses it elsewhere in the workspace.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;

#[derive(Clone)]
struct ActuatorState {
	registry: Arc<Mutex<Registry>>,
}

/// Builds the management router: `/actuator/health` (liveness, always
/// 200 once the process is serving), `/actuator/ready` (readiness — this
/// core keeps no warm-up state of its own, so it is identical to
/// liveness; a surrounding host with its own startup probes may still
/// compose this router with additional checks), and `/metrics`.
pub fn actuator_router(registry: Registry) -> Router {
	let state = ActuatorState { registry: Arc::new(Mutex::new(registry)) };
	Router::new()
		.route("/actuator/health", get(health))
		.route("/actuator/ready", get(health))
		.route("/metrics", get(metrics))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn metrics(State(state): State<ActuatorState>) -> Result<String, StatusCode> {
	let mut buffer = String::new();
	let registry = state.registry.lock();
	encode(&mut buffer, &registry).map_err(|err| {
		tracing::error!(error = %err, "failed to encode metrics");
		StatusCode::INTERNAL_SERVER_ERROR
	})?;
	Ok(buffer)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request;
	use tower::ServiceExt;

	#[tokio::test]
	async fn health_is_always_ok() {
		let app = actuator_router(Registry::default());
		let response = app
			.oneshot(Request::builder().uri("/actuator/health").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn metrics_endpoint_serves_prometheus_text() {
		let app = actuator_router(Registry::default());
		let response = app
			.oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}
}
