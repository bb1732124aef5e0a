//! Session Validation Filter (spec §4.9): the route-scoped, strictly
//! ordered pipeline that turns a bearer token and a partner header into
//! either a rewritten, upstream-trusted request or a typed rejection.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Extension, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::HeaderMap;

use crate::config::PartnerValidation;
use crate::error::GatewayError;
use crate::headers::{self, PARTNER_HEADER};
use crate::session::Session;
use crate::store::SessionStoreClient;
use crate::token;

/// Route-scoped configuration the Pipeline Host attaches at router
/// construction time (spec §9, "dynamic config-object pattern" — modeled
/// as a plain immutable struct, not discovered dynamically per-request).
#[derive(Clone, Debug, Default)]
pub struct RouteFilterConfig {
	pub required_permissions: Vec<String>,
	/// Unprotected routes still pass through this middleware (it is
	/// wired globally per matched route) but skip the pipeline entirely —
	/// "authenticated but unrestricted" (spec §3) only applies to routes
	/// that opted in; a route can opt out of validation altogether.
	pub protected: bool,
	/// The route's configured path predicate, carried as its identifier
	/// for the rejection log (spec §4.10, §7: "route id").
	pub route_id: String,
}

/// Everything the filter needs that outlives a single request. The store
/// is a trait object so tests can substitute an in-memory fake for the
/// Redis-backed implementation (see `store::SessionStoreClient`).
pub struct ValidationState {
	pub store: Arc<dyn SessionStoreClient>,
	pub partner_validation: PartnerValidation,
}

/// Stamped at step 1 for downstream latency accounting; read only by
/// tests and diagnostics in this core, since end-to-end latency is the
/// Metrics Filter's concern.
#[derive(Clone, Copy, Debug)]
pub struct ValidationStartedAt(pub Instant);

pub async fn validate_session(
	State(state): State<Arc<ValidationState>>,
	Extension(route_config): Extension<RouteFilterConfig>,
	mut req: Request,
	next: Next,
) -> Response {
	// Stamped before any work so every rejection logged downstream —
	// including ones from the dispatch handler's own breaker — carries
	// the matched route's id and path (spec §4.10, §7).
	let route_context = (route_config.route_id.clone(), req.uri().path().to_string());

	crate::telemetry::log::ROUTE_CONTEXT
		.scope(route_context, async move {
			if !route_config.protected {
				return next.run(req).await;
			}

			match run(&state, &route_config, &mut req).await {
				Ok(session) => {
					req.extensions_mut().insert(Arc::new(session));
					next.run(req).await
				}
				Err(err) => err.into_response(),
			}
		})
		.await
}

async fn run(
	state: &ValidationState,
	route_config: &RouteFilterConfig,
	req: &mut Request,
) -> Result<Session, GatewayError> {
	// Step 1: stamp request start time into attributes.
	req.extensions_mut().insert(ValidationStartedAt(Instant::now()));

	// Step 2: Authorization header, present and non-blank.
	let authorization = read_header(req.headers(), http::header::AUTHORIZATION.as_str())
		.ok_or_else(|| GatewayError::SessionInvalid("missing Authorization header".into()))?;

	// Step 3: partner header, present and non-blank.
	let partner = req
		.headers()
		.get(&*PARTNER_HEADER)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.ok_or_else(|| GatewayError::SessionInvalid("missing partner header".into()))?
		.to_string();

	// Step 4: unsigned pre-parse to locate the session record.
	let session_id = token::extract_session_id(&authorization)?;

	// Step 5: session lookup (breaker "redis" + 3s timeout + JSON parse).
	let session = state.store.get(&partner, &session_id).await?;

	// (I4) record-vs-header partner agreement, case-insensitive.
	if !session.partner.eq_ignore_ascii_case(&partner) {
		return Err(GatewayError::SessionInvalid(
			"session record partner does not match inbound partner header".into(),
		));
	}

	// Optional defensive partner-in-token comparison (spec §9).
	if state.partner_validation == PartnerValidation::Defensive {
		if let Some(token_partner) = token::extract_partner_claim(&authorization) {
			if !token_partner.eq_ignore_ascii_case(&partner) {
				return Err(GatewayError::SessionInvalid(
					"token partner claim does not match inbound partner header".into(),
				));
			}
		}
	}

	// Step 6: authoritative HMAC verification.
	if !token::validate(&authorization, &session.session_secret) {
		return Err(GatewayError::SessionInvalid("token signature verification failed".into()));
	}

	// Step 7 (I5): a selected relationship must be present.
	if !session.has_valid_relationship() {
		return Err(GatewayError::SessionInvalid("no relationship selected".into()));
	}

	// Step 8 (P6): required permissions, if any, must be a subset.
	if !route_config.required_permissions.is_empty()
		&& !session.has_permissions(&route_config.required_permissions)
	{
		return Err(GatewayError::InsufficientPermissions);
	}

	// Step 9: successful validation, logged once with no secrets.
	tracing::info!(
		session_id = %session.session_id,
		partner = %session.partner,
		"session validated"
	);

	// Step 10: rewrite the request — allow-list plus envelope (I2, P2, P3).
	let rewritten = headers::filter_to_allow_list(req.headers());
	*req.headers_mut() = rewritten;
	for (name, value) in session.to_headers() {
		headers::set_overwrite(req.headers_mut(), name, value);
	}

	Ok(session)
}

fn read_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<String> {
	headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(str::to_string)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn read_header_rejects_blank_value() {
		let mut headers = HeaderMap::new();
		headers.insert("authorization", "   ".parse().unwrap());
		assert_eq!(read_header(&headers, "authorization"), None);
	}
}
