//! Pipeline Host (spec §4.11): owns global-filter order, binds the
//! Session Validation Filter to protected routes with their permission
//! list, and delegates upstream dispatch to an external proxy facility
//! through the [`UpstreamClient`] trait — connection pooling and response
//! streaming are out of scope for the core (spec §1).

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Extension, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use prometheus_client::registry::Registry;
use tower::ServiceBuilder;

use crate::breaker::Registry as BreakerRegistry;
use crate::config::Config;
use crate::error::GatewayError;
use crate::filters::correlation::CorrelationLayer;
use crate::filters::metrics::MetricsLayer;
use crate::error_mapper::ErrorKindExt;
use crate::filters::session_validation::{validate_session, RouteFilterConfig, ValidationState};
use crate::store::SessionStoreClient;
use crate::telemetry::metrics::Metrics;

/// The "external proxy facility" spec §1 places out of scope: the core
/// depends only on this trait, never on a specific transport stack.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
	async fn dispatch(&self, upstream: &str, req: Request<Body>) -> Result<Response, GatewayError>;
}

/// Production implementation backed by `reqwest`.
pub struct ReqwestUpstreamClient {
	client: reqwest::Client,
}

impl ReqwestUpstreamClient {
	pub fn new() -> Self {
		ReqwestUpstreamClient { client: reqwest::Client::new() }
	}
}

impl Default for ReqwestUpstreamClient {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
	async fn dispatch(&self, upstream: &str, req: Request<Body>) -> Result<Response, GatewayError> {
		let (parts, body) = req.into_parts();
		let url = format!("{}{}", upstream.trim_end_matches('/'), parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or(""));

		let body_bytes = axum::body::to_bytes(body, usize::MAX)
			.await
			.map_err(|err| GatewayError::Internal(format!("failed to buffer request body: {err}")))?;

		let mut upstream_req = self
			.client
			.request(parts.method, &url)
			.body(body_bytes.to_vec());
		for (name, value) in parts.headers.iter() {
			upstream_req = upstream_req.header(name, value);
		}

		let upstream_response = upstream_req.send().await.map_err(|err| {
			GatewayError::DownstreamUnavailable(format!("upstream dispatch failed: {err}"))
		})?;

		let status = upstream_response.status();
		let headers = upstream_response.headers().clone();
		let bytes = upstream_response
			.bytes()
			.await
			.map_err(|err| GatewayError::DownstreamUnavailable(format!("upstream read failed: {err}")))?;

		let mut response = Response::builder().status(status);
		for (name, value) in headers.iter() {
			response = response.header(name, value);
		}
		Ok(response.body(Body::from(bytes)).unwrap_or_else(|_| {
			GatewayError::Internal("failed to build upstream response".into()).into_response()
		}))
	}
}

/// Shared application state, threaded into every route handler.
pub struct GatewayState {
	pub upstream: Arc<dyn UpstreamClient>,
	pub breakers: Arc<BreakerRegistry>,
}

/// Builds the complete router: Correlation and Metrics wrap every route
/// globally; the Session Validation Filter is applied per-route via
/// `.layer(...)` on that route's `MethodRouter` so an unprotected route
/// pays nothing for it (spec §4.11). `breakers` is the same process-wide
/// registry the session store client uses for its `redis` breaker — the
/// `downstream` policy wraps upstream dispatch here.
pub fn build_router(
	config: &Config,
	store: Arc<dyn SessionStoreClient>,
	upstream: Arc<dyn UpstreamClient>,
	breakers: Arc<BreakerRegistry>,
	registry: &mut Registry,
) -> Router {
	let metrics = Arc::new(Metrics::new(registry));
	let validation = Arc::new(ValidationState {
		store,
		partner_validation: config.partner_validation,
	});
	let state = Arc::new(GatewayState { upstream, breakers });

	let mut router = Router::new();
	for route in &config.routes {
		let method_router = any(dispatch_handler)
			.layer(axum::middleware::from_fn_with_state(validation.clone(), validate_session))
			.layer(Extension(RouteFilterConfig {
				required_permissions: route.required_permissions.clone(),
				protected: route.protected,
				route_id: route.path.clone(),
			}))
			.layer(Extension(UpstreamTarget(route.upstream.clone())))
			.layer(Extension(RouteTimeout(route.timeout())));
		router = router.route(&route.path, method_router);
	}

	router
		.with_state(state)
		.layer(
			ServiceBuilder::new()
				.layer(MetricsLayer::new(metrics, config.metrics_path_normalization))
				.layer(CorrelationLayer),
		)
}

async fn dispatch_handler(State(state): State<Arc<GatewayState>>, req: Request) -> Response {
	// Upstream-URI resolution beyond this point (connection pooling,
	// response streaming) is the external proxy facility's job (spec §1);
	// the core only needs the base URL and timeout `build_router` attached
	// to the matched route.
	let upstream = req.extensions().get::<UpstreamTarget>().cloned().unwrap_or_default();
	let timeout = req
		.extensions()
		.get::<RouteTimeout>()
		.map(|t| t.0)
		.unwrap_or(Duration::from_secs(30));

	let breaker = state.breakers.breaker("downstream");
	let upstream_client = state.upstream.clone();

	let result = breaker
		.call(move || async move {
			tokio::time::timeout(timeout, upstream_client.dispatch(&upstream.0, req))
				.await
				.map_err(|_| {
					GatewayError::DownstreamUnavailable(format!(
						"upstream dispatch timed out after {timeout:?}"
					))
				})?
		})
		.await;

	match result {
		// The upstream's own status/body pass through unchanged (spec
		// §4.11's "response is streamed back unchanged"); a >=400 status
		// still gets the GATEWAY_ERROR kind stamped so the Metrics Filter
		// can label it, without the Error Mapper rewriting the body.
		Ok(mut response) if response.status().as_u16() >= 400 => {
			response.extensions_mut().insert(ErrorKindExt(
				GatewayError::Upstream { status: response.status() }.status_and_code().1,
			));
			response
		}
		Ok(response) => response,
		Err(err) => err.into_response(),
	}
}

/// Extension carrying the resolved upstream base URL for a matched route.
#[derive(Clone, Debug, Default)]
pub struct UpstreamTarget(pub String);

/// Per-route dispatch timeout (spec §5, §6), default 30s.
#[derive(Clone, Copy, Debug)]
pub struct RouteTimeout(pub Duration);
