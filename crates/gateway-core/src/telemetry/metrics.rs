//! Metrics Filter registry (spec §4.8): request counters, a duration
//! histogram, and an error counter, all labeled from a bounded,
//! pre-declared set to cap cardinality (I6, P7).
//!
//! Shape follows the teacher's `telemetry/metrics.rs`: a `Family` per
//! metric registered once against a `prometheus_client::Registry`.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

#[derive(Clone, Hash, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
	pub path: String,
	pub method: String,
	pub status: u16,
}

#[derive(Clone, Hash, Debug, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
	pub path: String,
	pub method: String,
	pub error_kind: String,
}

pub struct Metrics {
	pub requests: Family<RequestLabels, Counter>,
	pub request_duration_seconds: Family<RequestLabels, Histogram>,
	pub errors: Family<ErrorLabels, Counter>,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let requests = Family::<RequestLabels, Counter>::default();
		registry.register("gateway_requests", "Total requests handled", requests.clone());

		let request_duration_seconds =
			Family::<RequestLabels, Histogram>::new_with_constructor(|| {
				Histogram::new([0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0].into_iter())
			});
		registry.register(
			"gateway_request_duration_seconds",
			"Request latency in seconds",
			request_duration_seconds.clone(),
		);

		let errors = Family::<ErrorLabels, Counter>::default();
		registry.register("gateway_request_errors", "Total request failures", errors.clone());

		Metrics { requests, request_duration_seconds, errors }
	}

	pub fn record(&self, path: &str, method: &str, status: u16, duration_secs: f64) {
		self.requests
			.get_or_create(&RequestLabels { path: path.to_string(), method: method.to_string(), status })
			.inc();
		self.request_duration_seconds
			.get_or_create(&RequestLabels { path: path.to_string(), method: method.to_string(), status })
			.observe(duration_secs);
	}

	pub fn record_error(&self, path: &str, method: &str, error_kind: &str) {
		self.errors
			.get_or_create(&ErrorLabels {
				path: path.to_string(),
				method: method.to_string(),
				error_kind: error_kind.to_string(),
			})
			.inc();
	}
}

/// Known multi-step operation suffixes preserved under `/api/{service}/…`
/// (spec §4.8).
const KNOWN_SUFFIXES: &[&str] =
	&["validate", "form", "results", "approve", "documents", "settings"];

/// Path normalization strategy selected once at `Metrics` construction
/// time and fixed for the life of the process (spec §4.8, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationStrategy {
	/// Collapse numeric segments to `*`, preserve recognized operation
	/// suffixes, fall back to `/api/{service}/other` or `other`.
	#[default]
	PreserveSuffix,
	/// Collapse everything under a known service to `/api/{service}`.
	PrefixCollapse,
}

impl NormalizationStrategy {
	pub fn normalize(self, path: &str) -> String {
		match self {
			NormalizationStrategy::PreserveSuffix => normalize_preserve_suffix(path),
			NormalizationStrategy::PrefixCollapse => normalize_prefix_collapse(path),
		}
	}
}

fn is_numeric_segment(segment: &str) -> bool {
	!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn segments(path: &str) -> Vec<&str> {
	path.split('/').filter(|s| !s.is_empty()).collect()
}

fn normalize_preserve_suffix(path: &str) -> String {
	if path.starts_with("/actuator") {
		return "/actuator".to_string();
	}

	let segs = segments(path);
	if segs.first() != Some(&"api") || segs.len() < 2 {
		return "other".to_string();
	}

	let service = segs[1];
	if segs.len() == 2 {
		return format!("/api/{service}");
	}

	let rest = &segs[2..];
	let last = rest.last().copied().unwrap_or_default();
	if KNOWN_SUFFIXES.contains(&last) {
		let middle: Vec<&str> = rest[..rest.len() - 1]
			.iter()
			.map(|s| if is_numeric_segment(s) { "*" } else { s })
			.collect();
		if middle.is_empty() {
			return format!("/api/{service}/{last}");
		}
		return format!("/api/{service}/{}/{last}", middle.join("/"));
	}

	// All segments numeric-or-not, no recognized suffix: collapse numerics
	// and fall into the service's `other` bucket.
	let all_numeric_or_known = rest.iter().all(|s| is_numeric_segment(s));
	if all_numeric_or_known {
		format!("/api/{service}/*")
	} else {
		format!("/api/{service}/other")
	}
}

fn normalize_prefix_collapse(path: &str) -> String {
	if path.starts_with("/actuator") {
		return "/actuator".to_string();
	}

	let segs = segments(path);
	if segs.first() == Some(&"api") && segs.len() >= 2 {
		format!("/api/{}", segs[1])
	} else {
		"other".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn preserves_known_suffix_and_collapses_numeric_segment() {
		let normalized = NormalizationStrategy::PreserveSuffix.normalize("/api/simulation/42/validate");
		assert_eq!(normalized, "/api/simulation/*/validate");
	}

	#[test]
	fn unknown_subpath_falls_into_service_other() {
		let normalized = NormalizationStrategy::PreserveSuffix.normalize("/api/simulation/weird");
		assert_eq!(normalized, "/api/simulation/other");
	}

	#[test]
	fn unknown_top_level_path_is_other() {
		let normalized = NormalizationStrategy::PreserveSuffix.normalize("/health");
		assert_eq!(normalized, "other");
	}

	#[test]
	fn actuator_paths_collapse() {
		assert_eq!(NormalizationStrategy::PreserveSuffix.normalize("/actuator/health"), "/actuator");
		assert_eq!(NormalizationStrategy::PrefixCollapse.normalize("/actuator/health"), "/actuator");
	}

	#[test]
	fn prefix_collapse_ignores_suffix() {
		let normalized = NormalizationStrategy::PrefixCollapse.normalize("/api/simulation/42/validate");
		assert_eq!(normalized, "/api/simulation");
	}

	#[test]
	fn cardinality_is_bounded_across_many_distinct_ids() {
		let mut outputs = std::collections::HashSet::new();
		for id in 0..1000 {
			outputs.insert(NormalizationStrategy::PreserveSuffix.normalize(&format!("/api/simulation/{id}/validate")));
		}
		assert_eq!(outputs.len(), 1);
	}
}
