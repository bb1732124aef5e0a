//! Token Service (spec §4.6): two-pass JWT handling.
//!
//! The first pass extracts `sessionId` from the unsigned payload purely to
//! look up the session record that holds the verification key — it must
//! never influence a trust decision (spec §9, "two-pass JWT parse"). The
//! second pass is the authoritative HMAC-SHA256 check against that
//! session's secret.

use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
struct UnverifiedClaims {
	#[serde(rename = "sessionId")]
	session_id: String,
	/// Present only in deployments that embed the tenant in the token
	/// itself; read only for the optional defensive partner-in-token
	/// comparison (spec §9), never as a trust decision on its own.
	#[serde(default)]
	partner: Option<String>,
}

/// A JWT's `sessionId` claim is enough to structurally validate and
/// allow-list what jsonwebtoken requires, without asserting anything
/// about signature or expiry.
#[derive(Debug, Deserialize)]
struct VerifiedClaims {
	#[allow(dead_code)]
	#[serde(rename = "sessionId")]
	session_id: String,
}

/// Strips an optional `Bearer ` prefix, splits the compact JWT form, and
/// decodes the unsigned payload segment to read `sessionId`. Does not
/// verify the signature. Malformed input at any step is SessionInvalid
/// (spec §4.6).
pub fn extract_session_id(token: &str) -> Result<String, GatewayError> {
	let claims = decode_unverified(token)?;
	if claims.session_id.trim().is_empty() {
		return Err(GatewayError::SessionInvalid("token sessionId is empty".into()));
	}
	Ok(claims.session_id)
}

/// Reads the optional `partner` claim from the unsigned payload, for the
/// defensive partner-in-token comparison (spec §9). Returns `None` both
/// when the token is malformed and when the claim is simply absent — the
/// caller only acts on a present-and-mismatching claim, never on absence.
pub fn extract_partner_claim(token: &str) -> Option<String> {
	decode_unverified(token).ok().and_then(|claims| claims.partner)
}

fn decode_unverified(token: &str) -> Result<UnverifiedClaims, GatewayError> {
	let token = strip_bearer(token);
	let parts: Vec<&str> = token.split('.').collect();
	if parts.len() != 3 {
		return Err(GatewayError::SessionInvalid(
			"token is not a three-part compact JWT".to_string(),
		));
	}

	let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
		.decode(parts[1])
		.map_err(|_| GatewayError::SessionInvalid("token payload is not valid base64url".into()))?;

	serde_json::from_slice(&payload)
		.map_err(|_| GatewayError::SessionInvalid("token payload is not valid JSON".into()))
}

/// Authoritative HMAC-SHA256 verification of `token` against the
/// session's own secret. Returns `false` for any failure mode — bad
/// signature, malformed structure, wrong algorithm, or an expired `exp`
/// claim if one is encoded (spec §4.6). The secret is never logged;
/// `SecretString` keeps it out of any accidental `Debug`/`Display` use.
pub fn validate(token: &str, session_secret: &SecretString) -> bool {
	let token = strip_bearer(token);
	let key = DecodingKey::from_secret(session_secret.expose_secret().as_bytes());

	let mut validation = Validation::new(Algorithm::HS256);
	// Tokens here carry only `sessionId` at minimum (spec §6); don't demand
	// spec claims (`exp`, etc.) that may not be present, but still honor
	// `exp` if the issuer included one.
	validation.required_spec_claims.clear();
	validation.validate_exp = true;

	jsonwebtoken::decode::<VerifiedClaims>(token, &key, &validation).is_ok()
}

fn strip_bearer(token: &str) -> &str {
	token.strip_prefix("Bearer ").unwrap_or(token)
}

#[cfg(test)]
mod tests {
	use super::*;
	use jsonwebtoken::{encode, EncodingKey, Header};
	use serde::Serialize;

	#[derive(Serialize)]
	struct Claims<'a> {
		#[serde(rename = "sessionId")]
		session_id: &'a str,
	}

	fn make_token(session_id: &str, secret: &str) -> String {
		encode(
			&Header::new(Algorithm::HS256),
			&Claims { session_id },
			&EncodingKey::from_secret(secret.as_bytes()),
		)
		.unwrap()
	}

	#[test]
	fn extracts_session_id_without_verifying() {
		let token = make_token("s-1", "whatever-secret");
		assert_eq!(extract_session_id(&token).unwrap(), "s-1");
	}

	#[test]
	fn extract_rejects_malformed_token() {
		assert!(extract_session_id("not-a-jwt").is_err());
		assert!(extract_session_id("a.b").is_err());
	}

	#[test]
	fn partner_claim_is_none_when_absent() {
		let token = make_token("s-1", "whatever-secret");
		assert_eq!(extract_partner_claim(&token), None);
	}

	#[test]
	fn validate_accepts_matching_secret() {
		let token = make_token("s-1", "correct-secret");
		let secret = SecretString::from("correct-secret".to_string());
		assert!(validate(&token, &secret));
	}

	#[test]
	fn validate_rejects_wrong_secret() {
		let token = make_token("s-1", "correct-secret");
		let secret = SecretString::from("wrong-secret".to_string());
		assert!(!validate(&token, &secret));
	}

	#[test]
	fn validate_tolerates_bearer_prefix() {
		let token = make_token("s-1", "correct-secret");
		let secret = SecretString::from("correct-secret".to_string());
		assert!(validate(&format!("Bearer {token}"), &secret));
	}
}
