//! Session Model (spec §3, §4.2): the in-memory representation of a
//! session record and its derivation helpers. The gateway is strictly a
//! reader of this data — creation, mutation, and expiry belong to the
//! identity service.

use std::collections::BTreeSet;

use secrecy::SecretString;
use serde::Deserialize;

use crate::headers::envelope;

/// A per-user authenticated context, as written by the identity service
/// into the shared session cache. Decoding tolerates unknown fields (the
/// identity service is free to add fields the gateway doesn't read yet);
/// missing required fields are a parse failure, which is the `serde`
/// default behavior for non-`Option` fields and needs no extra attribute.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
	pub session_id: String,
	pub partner: String,
	pub session_secret: SecretString,
	pub user_info: UserInfo,
	pub fund: Fund,
	pub relationship_list: Vec<Relationship>,
	pub relationship_selected: Option<Relationship>,
	pub permissions: BTreeSet<String>,
	#[serde(default)]
	pub created_at: Option<String>,
	#[serde(default)]
	pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
	pub document_number: String,
	pub full_name: String,
	pub email: String,
	#[serde(default)]
	pub phone: Option<String>,
	#[serde(default)]
	pub birth_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fund {
	pub id: String,
	pub name: String,
	#[serde(rename = "type")]
	pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: String,
	pub display_name: String,
	pub status: String,
	pub contract_number: String,
}

impl Session {
	/// The cache key the store client reads this record under (spec §4.2).
	pub fn redis_key(partner: &str, session_id: &str) -> String {
		format!("fidc:session:{partner}:{session_id}")
	}

	/// (I5) A protected route requires a selected relationship.
	pub fn has_valid_relationship(&self) -> bool {
		self.relationship_selected.is_some()
	}

	/// (P6) Set-containment of `required` in the session's permissions.
	/// Comparison is case-sensitive, matching spec §3's route config note.
	pub fn has_permissions(&self, required: &[String]) -> bool {
		required.iter().all(|p| self.permissions.contains(p))
	}

	/// Deterministic mapping to the envelope headers (spec §4.2); optional
	/// fields are omitted when empty. Used by the Session Validation Filter
	/// to rewrite the outbound request (I2, P2).
	pub fn to_headers(&self) -> Vec<(&'static str, String)> {
		let mut out = vec![
			(envelope::USER_DOCUMENT_NUMBER, self.user_info.document_number.clone()),
			(envelope::USER_EMAIL, self.user_info.email.clone()),
			(envelope::USER_NAME, self.user_info.full_name.clone()),
			(envelope::FUND_ID, self.fund.id.clone()),
			(envelope::FUND_NAME, self.fund.name.clone()),
			(envelope::PARTNER, self.partner.clone()),
			(envelope::SESSION_ID, self.session_id.clone()),
		];

		if let Some(rel) = &self.relationship_selected {
			out.push((envelope::RELATIONSHIP_ID, rel.id.clone()));
			out.push((envelope::CONTRACT_NUMBER, rel.contract_number.clone()));
		}

		let joined = self.permissions_header();
		if !joined.is_empty() {
			out.push((envelope::USER_PERMISSIONS, joined));
		}

		out
	}

	/// Comma-joined, uppercase permission codes with no separating spaces
	/// (spec §4.2). Permission codes are stored uppercase at decode time
	/// already; upper-cased again here since the invariant belongs to the
	/// field itself, not just to well-behaved callers.
	pub fn permissions_header(&self) -> String {
		self.permissions
			.iter()
			.map(|p| p.to_ascii_uppercase())
			.collect::<Vec<_>>()
			.join(",")
	}
}
