//! Header Envelope (spec §4.1): the canonical set of headers the gateway
//! injects into upstream requests, and the allow-list governing which
//! inbound headers are forwarded at all.

use http::{HeaderMap, HeaderName, HeaderValue};
use once_cell::sync::Lazy;

pub const CORRELATION_ID: &str = "X-Correlation-ID";
pub const PARTNER: &str = "partner";

/// Pre-parsed `HeaderName` for [`CORRELATION_ID`], shared by the
/// Correlation Filter so every request doesn't re-validate the literal.
pub static CORRELATION_ID_HEADER: Lazy<HeaderName> =
	Lazy::new(|| HeaderName::from_static("x-correlation-id"));

/// Pre-parsed `HeaderName` for [`PARTNER`].
pub static PARTNER_HEADER: Lazy<HeaderName> = Lazy::new(|| HeaderName::from_static("partner"));

/// Envelope header names, injected exclusively from a validated
/// [`crate::session::Session`] — never merged with inbound values.
pub mod envelope {
	pub const USER_DOCUMENT_NUMBER: &str = "userDocumentNumber";
	pub const USER_EMAIL: &str = "userEmail";
	pub const USER_NAME: &str = "userName";
	pub const FUND_ID: &str = "fundId";
	pub const FUND_NAME: &str = "fundName";
	pub const PARTNER: &str = "partner";
	pub const SESSION_ID: &str = "sessionId";
	pub const RELATIONSHIP_ID: &str = "relationshipId";
	pub const CONTRACT_NUMBER: &str = "contractNumber";
	pub const USER_PERMISSIONS: &str = "userPermissions";
}

/// Inbound headers that are forwarded to upstream as-is, when present.
/// Everything else is stripped before dispatch (spec §4.1, I2).
const ALLOW_LIST: &[&str] = &[
	"accept",
	"accept-encoding",
	"accept-language",
	"content-length",
	"content-type",
	"x-correlation-id",
	"x-trace-id",
	"x-request-id",
	"x-span-id",
	"x-client-version",
	"x-api-version",
	"if-none-match",
	"if-modified-since",
];

/// Returns true if `name` may be forwarded to upstream verbatim.
pub fn is_allow_listed(name: &HeaderName) -> bool {
	ALLOW_LIST.iter().any(|allowed| name.as_str().eq_ignore_ascii_case(allowed))
}

/// Builds the outbound header map from an inbound one: keeps only
/// allow-listed headers, dropping everything else (spec §4.1, I2, P3).
pub fn filter_to_allow_list(inbound: &HeaderMap) -> HeaderMap {
	let mut out = HeaderMap::with_capacity(inbound.len());
	for (name, value) in inbound {
		if is_allow_listed(name) {
			out.append(name.clone(), value.clone());
		}
	}
	out
}

/// Sets a single header, overwriting any prior value(s) under that name —
/// envelope values are never merged with whatever the client sent (spec §4.1).
pub fn set_overwrite(headers: &mut HeaderMap, name: &str, value: impl Into<String>) {
	let value = value.into();
	let (Ok(header_name), Ok(header_value)) = (
		HeaderName::from_bytes(name.as_bytes()),
		HeaderValue::from_str(&value),
	) else {
		return;
	};
	headers.insert(header_name, header_value);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_non_allow_listed_headers() {
		let mut inbound = HeaderMap::new();
		inbound.insert("content-type", HeaderValue::from_static("application/json"));
		inbound.insert("x-internal-debug", HeaderValue::from_static("1"));
		let out = filter_to_allow_list(&inbound);
		assert!(out.contains_key("content-type"));
		assert!(!out.contains_key("x-internal-debug"));
	}

	#[test]
	fn allow_list_is_case_insensitive() {
		let name = HeaderName::from_static("x-correlation-id");
		assert!(is_allow_listed(&name));
	}
}
