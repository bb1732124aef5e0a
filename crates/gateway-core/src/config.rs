//! Configuration Surface (spec §6): the typed config struct plus a
//! loader, following the teacher's split between `Config` and a
//! `parse_config` function that accepts either a file path or an inline
//! string.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::telemetry::metrics::NormalizationStrategy;

/// How the defensive partner-in-token comparison (spec §9) is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartnerValidation {
	/// Compare the token's `partner` claim (if present) against the
	/// inbound header, in addition to (I4)'s record-vs-header check.
	#[default]
	Defensive,
	/// Rely solely on (I4): the fetched record's partner field must match
	/// the header.
	HeaderOnly,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
	pub host: String,
	#[serde(default = "default_redis_port")]
	pub port: u16,
	#[serde(default)]
	pub password: Option<SecretString>,
	#[serde(default = "default_redis_pool_size")]
	pub pool_size: u32,
}

fn default_redis_port() -> u16 {
	6379
}

fn default_redis_pool_size() -> u32 {
	10
}

impl RedisConfig {
	pub fn connection_url(&self) -> String {
		match &self.password {
			Some(password) => {
				format!(
					"redis://:{}@{}:{}",
					secrecy::ExposeSecret::expose_secret(password),
					self.host,
					self.port
				)
			}
			None => format!("redis://{}:{}", self.host, self.port),
		}
	}
}

/// One entry of the external route table (spec §3 "Route Config", §6).
/// Route matching and upstream-URI resolution are external collaborators;
/// the core only needs the fields that drive the Session Validation
/// Filter and upstream dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
	/// Path predicate, matched by the external route table; carried here
	/// only for config validation and test fixtures.
	pub path: String,
	pub upstream: String,
	#[serde(default)]
	pub required_permissions: Vec<String>,
	#[serde(default)]
	pub timeout_seconds: Option<u64>,
	/// Absence means the route is unprotected (spec §3: "Absence or empty
	/// list means authenticated but unrestricted" — but an entirely
	/// unauthenticated route must opt out of the filter altogether).
	#[serde(default = "default_protected")]
	pub protected: bool,
}

fn default_protected() -> bool {
	true
}

impl RouteConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_seconds.unwrap_or(30))
	}
}

/// Where the actuator surface (spec §6) is bound — liveness, readiness,
/// and `/metrics`, separate from the proxy listener so a restrictive
/// network policy can scope them differently.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagementConfig {
	pub host: String,
	pub port: u16,
}

impl Default for ManagementConfig {
	fn default() -> Self {
		ManagementConfig { host: "0.0.0.0".to_string(), port: 9090 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
	pub service_name: String,
	pub redis: RedisConfig,
	pub routes: Vec<RouteConfig>,
	pub partner_validation: PartnerValidation,
	pub metrics_path_normalization: NormalizationStrategy,
	pub json_logs: bool,
	pub management: ManagementConfig,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			service_name: "session-gateway".to_string(),
			redis: RedisConfig {
				host: "localhost".to_string(),
				port: default_redis_port(),
				password: None,
				pool_size: default_redis_pool_size(),
			},
			routes: Vec::new(),
			partner_validation: PartnerValidation::default(),
			metrics_path_normalization: NormalizationStrategy::default(),
			json_logs: false,
			management: ManagementConfig::default(),
		}
	}
}

/// Loads configuration from a YAML string. The caller decides whether
/// that string came from `--file` (read from disk) or `--config` (passed
/// inline) — both end up here, mirroring the teacher's CLI duality.
pub fn parse_config(yaml: &str) -> anyhow::Result<Config> {
	let config: Config = serde_yaml::from_str(yaml)?;
	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_minimal_config_with_defaults() {
		let yaml = r#"
redis:
  host: redis.internal
routes:
  - path: /api/simulation
    upstream: http://simulation-service
    required_permissions: ["VIEW_SIMULATION_RESULTS"]
"#;
		let config = parse_config(yaml).unwrap();
		assert_eq!(config.redis.host, "redis.internal");
		assert_eq!(config.redis.port, 6379);
		assert_eq!(config.partner_validation, PartnerValidation::Defensive);
		assert_eq!(config.routes.len(), 1);
		assert!(config.routes[0].protected);
	}
}
