//! Metrics Filter (spec §4.8), wired as a `tower::Layer`. Runs at lowest
//! precedence — applied outermost around the whole router, including the
//! Correlation Filter and the Error Mapper — so it always observes the
//! final response status, success or failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::Request;
use axum::response::Response;
use tower::{Layer, Service};

use crate::error_mapper::ErrorKindExt;
use crate::telemetry::metrics::{Metrics, NormalizationStrategy};

#[derive(Clone)]
pub struct MetricsLayer {
	metrics: Arc<Metrics>,
	normalization: NormalizationStrategy,
}

impl MetricsLayer {
	pub fn new(metrics: Arc<Metrics>, normalization: NormalizationStrategy) -> Self {
		MetricsLayer { metrics, normalization }
	}
}

impl<S> Layer<S> for MetricsLayer {
	type Service = MetricsService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		MetricsService { inner, metrics: self.metrics.clone(), normalization: self.normalization }
	}
}

#[derive(Clone)]
pub struct MetricsService<S> {
	inner: S,
	metrics: Arc<Metrics>,
	normalization: NormalizationStrategy,
}

impl<S> Service<Request> for MetricsService<S>
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

	fn call(&mut self, req: Request) -> Self::Future {
		let method = req.method().to_string();
		let path = self.normalization.normalize(req.uri().path());
		let metrics = self.metrics.clone();

		let clone = self.inner.clone();
		let mut inner = std::mem::replace(&mut self.inner, clone);

		Box::pin(async move {
			let start = Instant::now();
			let response = inner.call(req).await?;
			let elapsed = start.elapsed().as_secs_f64();
			let status = response.status().as_u16();

			metrics.record(&path, &method, status, elapsed);
			if status >= 400 {
				let kind = response
					.extensions()
					.get::<ErrorKindExt>()
					.map(|k| k.0)
					.unwrap_or("UNKNOWN");
				metrics.record_error(&path, &method, kind);
			}

			Ok(response)
		})
	}
}
