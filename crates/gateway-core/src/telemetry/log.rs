//! Structured logging setup and the correlation-id propagation context
//! (spec §4.7). Scaled down sharply from the teacher's own
//! `telemetry/log.rs` — this system needs one setup function and a
//! task-local slot, not a CEL/LLM-aware structured-field pipeline.

use tracing_subscriber::{fmt, EnvFilter};

tokio::task_local! {
	/// The active request's correlation id, readable by any component
	/// downstream of the Correlation Filter without threading it through
	/// every function signature (spec §4.7, propagation context (c)).
	pub static CORRELATION_ID: String;

	/// The (route id, path) of the request currently executing on this
	/// task, set by the Session Validation Filter once a route has
	/// matched. The Error Mapper reads this so a rejection's WARN/ERROR
	/// line can carry route id and path alongside the correlation id
	/// (spec §4.10, §7) without `IntoResponse` needing access to the
	/// original request.
	pub static ROUTE_CONTEXT: (String, String);
}

/// Reads the correlation id of the request currently executing on this
/// task, if the Correlation Filter has set one.
pub fn current_correlation_id() -> Option<String> {
	CORRELATION_ID.try_with(|id| id.clone()).ok()
}

/// Reads the (route id, path) of the request currently executing on this
/// task, if the Session Validation Filter has set one.
pub fn current_route_context() -> Option<(String, String)> {
	ROUTE_CONTEXT.try_with(|ctx| ctx.clone()).ok()
}

/// Initializes the global `tracing` subscriber. `json` selects
/// machine-readable output (for production); otherwise a compact
/// human-readable formatter is used (for local development) — matching
/// the teacher's environment-driven choice in its own setup function.
pub fn init_tracing(json: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	let subscriber = fmt().with_env_filter(filter);
	if json {
		subscriber.json().init();
	} else {
		subscriber.init();
	}
}
