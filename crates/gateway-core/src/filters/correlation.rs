//! Correlation Filter (spec §4.7): global, highest precedence. Generates
//! or propagates a correlation id across the outbound request header, a
//! per-request extension, the async propagation context, and the logging
//! context — cleared on every exit path.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::Response;
use http::HeaderValue;
use tower::{Layer, Service};
use uuid::Uuid;

use crate::headers::CORRELATION_ID_HEADER;
use crate::telemetry::log::CORRELATION_ID;

/// Per-request extension carrying the correlation id to downstream
/// extractors (spec §4.7, attribute (b)).
#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

#[derive(Clone, Copy, Default)]
pub struct CorrelationLayer;

impl<S> Layer<S> for CorrelationLayer {
	type Service = CorrelationService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		CorrelationService { inner }
	}
}

#[derive(Clone)]
pub struct CorrelationService<S> {
	inner: S,
}

impl<S> Service<Request> for CorrelationService<S>
where
	S: Service<Request, Response = Response> + Clone + Send + 'static,
	S::Future: Send + 'static,
{
	type Response = Response;
	type Error = S::Error;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx)
	}

	fn call(&mut self, mut req: Request) -> Self::Future {
		let id = req
			.headers()
			.get(&*CORRELATION_ID_HEADER)
			.and_then(|v| v.to_str().ok())
			.filter(|s| !s.is_empty())
			.map(str::to_string)
			.unwrap_or_else(|| Uuid::new_v4().to_string());

		if let Ok(value) = HeaderValue::from_str(&id) {
			req.headers_mut().insert(&*CORRELATION_ID_HEADER, value);
		}
		req.extensions_mut().insert(CorrelationId(id.clone()));

		// `poll_ready`/`call` must be paired on the same clone (tower
		// convention for services that aren't `Sync`-safe to share).
		let clone = self.inner.clone();
		let mut inner = std::mem::replace(&mut self.inner, clone);

		let response_id = id.clone();
		Box::pin(CORRELATION_ID.scope(id, async move {
			let mut response = inner.call(req).await?;
			if let Ok(value) = HeaderValue::from_str(&response_id) {
				response.headers_mut().insert(&*CORRELATION_ID_HEADER, value);
			}
			Ok(response)
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::routing::get;
	use axum::Router;
	use tower::ServiceExt;

	async fn handler() -> &'static str {
		"ok"
	}

	#[tokio::test]
	async fn generates_a_correlation_id_when_absent() {
		let app = Router::new().route("/", get(handler)).layer(CorrelationLayer);
		let request = Request::builder().uri("/").body(Body::empty()).unwrap();
		let response = app.oneshot(request).await.unwrap();
		let header = response.headers().get(&*CORRELATION_ID_HEADER).unwrap();
		assert!(!header.to_str().unwrap().is_empty());
	}

	#[tokio::test]
	async fn preserves_inbound_correlation_id() {
		let app = Router::new().route("/", get(handler)).layer(CorrelationLayer);
		let request = Request::builder()
			.uri("/")
			.header("x-correlation-id", "abc-123")
			.body(Body::empty())
			.unwrap();
		let response = app.oneshot(request).await.unwrap();
		let header = response.headers().get(&*CORRELATION_ID_HEADER).unwrap();
		assert_eq!(header.to_str().unwrap(), "abc-123");
	}
}
