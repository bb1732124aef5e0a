//! Session Store Client (spec §4.5): a single non-blocking read against
//! the shared session cache, wrapped outer-to-inner by the `redis`
//! breaker and a 3-second timeout.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::breaker::Registry;
use crate::error::GatewayError;
use crate::session::Session;

const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Single operation the Session Validation Filter needs from the store
/// (spec §4.5). A trait, not a concrete type, so tests can substitute an
/// in-memory fake instead of a live Redis — the same seam `proxy.rs` uses
/// for `UpstreamClient`.
#[async_trait::async_trait]
pub trait SessionStoreClient: Send + Sync {
	async fn get(&self, partner: &str, session_id: &str) -> Result<Session, GatewayError>;
}

/// Reads session records out of Redis. Holds a [`ConnectionManager`],
/// which reconnects transparently on its own — the store client only
/// needs to add the timeout and breaker wrapping spec §4.5 describes, not
/// a reconnect loop of its own (see DESIGN.md, §4.5a).
#[derive(Clone)]
pub struct RedisSessionStore {
	connection: ConnectionManager,
	breakers: Arc<Registry>,
}

impl RedisSessionStore {
	pub fn new(connection: ConnectionManager, breakers: Arc<Registry>) -> Self {
		RedisSessionStore { connection, breakers }
	}
}

#[async_trait::async_trait]
impl SessionStoreClient for RedisSessionStore {
	/// `get(partner, sessionId) -> SessionRecord` (spec §4.5). Composition
	/// outer to inner: breaker "redis" → 3 s timeout → GET → JSON parse.
	/// Only the I/O step runs inside the breaker's call — a key simply
	/// being absent, or its value failing to parse, is a data outcome,
	/// not a dependency failure, and must not count against the redis
	/// breaker's sliding window (spec §4.5, §7: only I/O/timeout failures
	/// propagate through the breaker). An empty/absent key is
	/// SessionInvalid (I4 requires a matching record to exist, not just a
	/// matching header); a parse failure is Internal, logged by key and
	/// payload length only, never content.
	async fn get(&self, partner: &str, session_id: &str) -> Result<Session, GatewayError> {
		let key = Session::redis_key(partner, session_id);
		let breaker = self.breakers.breaker("redis");
		let mut connection = self.connection.clone();
		let read_key = key.clone();

		let raw: Option<Vec<u8>> = breaker
			.call(move || async move {
				tokio::time::timeout(READ_TIMEOUT, connection.get(&read_key))
					.await
					.map_err(|_| {
						GatewayError::SessionServiceUnavailable(format!(
							"session read timed out after {READ_TIMEOUT:?}"
						))
					})?
					.map_err(|err| {
						GatewayError::SessionServiceUnavailable(format!(
							"session store read failed: {err}"
						))
					})
			})
			.await?;

		match raw {
			None => Err(GatewayError::SessionInvalid(format!("no session at {key}"))),
			Some(bytes) if bytes.is_empty() => {
				Err(GatewayError::SessionInvalid(format!("no session at {key}")))
			}
			Some(bytes) => {
				let len = bytes.len();
				serde_json::from_slice(&bytes).map_err(|_| {
					tracing::error!(key = %key, payload_len = len, "session record parse failure");
					GatewayError::Internal("session record is not valid JSON".to_string())
				})
			}
		}
	}
}
