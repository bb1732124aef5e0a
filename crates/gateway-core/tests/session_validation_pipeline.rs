//! End-to-end tests of the whole pipeline `build_router` assembles:
//! Correlation → Metrics → Session Validation → dispatch. Runs against an
//! in-memory `FakeStore` (substituted for `RedisSessionStore` through the
//! `SessionStoreClient` trait, so no live Redis is needed) and a real
//! `wiremock` upstream.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use gateway_core::breaker::Registry as BreakerRegistry;
use gateway_core::config::{Config, ManagementConfig, PartnerValidation, RedisConfig, RouteConfig};
use gateway_core::error::GatewayError;
use gateway_core::proxy::{build_router, ReqwestUpstreamClient};
use gateway_core::session::{Fund, Relationship, Session, UserInfo};
use gateway_core::store::SessionStoreClient;
use gateway_core::telemetry::metrics::NormalizationStrategy;
use http::{Request, StatusCode};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use prometheus_client::registry::Registry as MetricsRegistry;
use secrecy::SecretString;
use serde::Serialize;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

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

fn sample_session(partner: &str, session_id: &str, secret: &str, permissions: &[&str]) -> Session {
	Session {
		session_id: session_id.to_string(),
		partner: partner.to_string(),
		session_secret: SecretString::from(secret.to_string()),
		user_info: UserInfo {
			document_number: "123".to_string(),
			full_name: "Jane Doe".to_string(),
			email: "jane@example.com".to_string(),
			phone: None,
			birth_date: None,
		},
		fund: Fund {
			id: "f-1".to_string(),
			name: "Growth Fund".to_string(),
			kind: "PENSION".to_string(),
		},
		relationship_list: Vec::new(),
		relationship_selected: Some(Relationship {
			id: "REL001".to_string(),
			kind: "HOLDER".to_string(),
			display_name: "Jane Doe".to_string(),
			status: "ACTIVE".to_string(),
			contract_number: "378192372163682".to_string(),
		}),
		permissions: permissions.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
		created_at: None,
		updated_at: None,
	}
}

/// Stands in for `RedisSessionStore` in tests — a plain map, no network.
struct FakeStore {
	sessions: Mutex<HashMap<(String, String), Session>>,
}

impl FakeStore {
	fn new() -> Self {
		FakeStore { sessions: Mutex::new(HashMap::new()) }
	}

	fn with(session: Session) -> Arc<Self> {
		let store = FakeStore::new();
		store.insert(session);
		Arc::new(store)
	}

	fn insert(&self, session: Session) {
		let key = (session.partner.clone(), session.session_id.clone());
		self.sessions.lock().unwrap().insert(key, session);
	}

	/// Stores `session` under a lookup key independent of its own
	/// `partner` field — for exercising the record-vs-header partner
	/// mismatch check (I4), where the stored record was produced under a
	/// different partner than the header used to fetch it.
	fn insert_at(&self, lookup_partner: &str, session: Session) {
		let key = (lookup_partner.to_string(), session.session_id.clone());
		self.sessions.lock().unwrap().insert(key, session);
	}
}

#[async_trait::async_trait]
impl SessionStoreClient for FakeStore {
	async fn get(&self, partner: &str, session_id: &str) -> Result<Session, GatewayError> {
		self.sessions
			.lock()
			.unwrap()
			.get(&(partner.to_string(), session_id.to_string()))
			.cloned()
			.ok_or_else(|| {
				GatewayError::SessionInvalid(format!("no session at fidc:session:{partner}:{session_id}"))
			})
	}
}

fn base_config(upstream: &str) -> Config {
	Config {
		service_name: "session-gateway-test".to_string(),
		redis: RedisConfig { host: "localhost".to_string(), port: 6379, password: None, pool_size: 10 },
		routes: vec![
			RouteConfig {
				path: "/api/simulation".to_string(),
				upstream: upstream.to_string(),
				required_permissions: vec!["VIEW_SIMULATION_RESULTS".to_string()],
				timeout_seconds: Some(5),
				protected: true,
			},
			RouteConfig {
				path: "/api/public/health".to_string(),
				upstream: upstream.to_string(),
				required_permissions: Vec::new(),
				timeout_seconds: Some(5),
				protected: false,
			},
		],
		partner_validation: PartnerValidation::Defensive,
		metrics_path_normalization: NormalizationStrategy::PreserveSuffix,
		json_logs: false,
		management: ManagementConfig::default(),
	}
}

fn router_with_store(
	config: &Config,
	store: Arc<dyn SessionStoreClient>,
) -> axum::Router {
	let breakers = Arc::new(BreakerRegistry::new());
	let upstream = Arc::new(ReqwestUpstreamClient::new());
	let mut registry = MetricsRegistry::default();
	build_router(config, store, upstream, breakers, &mut registry)
}

async fn mock_upstream() -> MockServer {
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/api/simulation"))
		.and(header("userdocumentnumber", "123"))
		.respond_with(ResponseTemplate::new(200).set_body_string("ok"))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/api/public/health"))
		.respond_with(ResponseTemplate::new(200).set_body_string("healthy"))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/api/simulation"))
		.and(header("userdocumentnumber", "409"))
		.respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
		.mount(&server)
		.await;
	server
}

#[tokio::test]
async fn valid_session_is_rewritten_and_forwarded() {
	let upstream = mock_upstream().await;
	let session = sample_session("prevcom", "s-1", "correct-secret", &["VIEW_SIMULATION_RESULTS"]);
	let token = make_token("s-1", "correct-secret");
	let config = base_config(&upstream.uri());
	let router = router_with_store(&config, FakeStore::with(session));

	let request = Request::builder()
		.method("GET")
		.uri("/api/simulation")
		.header("authorization", format!("Bearer {token}"))
		.header("partner", "prevcom")
		.header("x-internal-debug", "leak-me-not")
		.body(Body::empty())
		.unwrap();

	let response = router.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_authorization_header_is_rejected() {
	let upstream = mock_upstream().await;
	let config = base_config(&upstream.uri());
	let router = router_with_store(&config, Arc::new(FakeStore::new()));

	let request = Request::builder()
		.method("GET")
		.uri("/api/simulation")
		.header("partner", "prevcom")
		.body(Body::empty())
		.unwrap();

	let response = router.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_session_id_is_rejected() {
	let upstream = mock_upstream().await;
	let config = base_config(&upstream.uri());
	let router = router_with_store(&config, Arc::new(FakeStore::new()));
	let token = make_token("nonexistent", "whatever");

	let request = Request::builder()
		.method("GET")
		.uri("/api/simulation")
		.header("authorization", format!("Bearer {token}"))
		.header("partner", "prevcom")
		.body(Body::empty())
		.unwrap();

	let response = router.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn partner_header_mismatch_is_rejected() {
	// The record itself claims `partner: "prevcom"`, but it's stored (and
	// fetched) under the "othercorp" header — (I4) must still reject this
	// even though the lookup by header succeeds.
	let upstream = mock_upstream().await;
	let session = sample_session("prevcom", "s-1", "correct-secret", &["VIEW_SIMULATION_RESULTS"]);
	let token = make_token("s-1", "correct-secret");
	let config = base_config(&upstream.uri());
	let store = FakeStore::new();
	store.insert_at("othercorp", session);
	let router = router_with_store(&config, Arc::new(store));

	let request = Request::builder()
		.method("GET")
		.uri("/api/simulation")
		.header("authorization", format!("Bearer {token}"))
		.header("partner", "othercorp")
		.body(Body::empty())
		.unwrap();

	let response = router.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_signature_is_rejected() {
	let upstream = mock_upstream().await;
	let session = sample_session("prevcom", "s-1", "correct-secret", &["VIEW_SIMULATION_RESULTS"]);
	let token = make_token("s-1", "some-other-secret");
	let config = base_config(&upstream.uri());
	let router = router_with_store(&config, FakeStore::with(session));

	let request = Request::builder()
		.method("GET")
		.uri("/api/simulation")
		.header("authorization", format!("Bearer {token}"))
		.header("partner", "prevcom")
		.body(Body::empty())
		.unwrap();

	let response = router.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_relationship_is_rejected() {
	let upstream = mock_upstream().await;
	let mut session = sample_session("prevcom", "s-1", "correct-secret", &["VIEW_SIMULATION_RESULTS"]);
	session.relationship_selected = None;
	let token = make_token("s-1", "correct-secret");
	let config = base_config(&upstream.uri());
	let router = router_with_store(&config, FakeStore::with(session));

	let request = Request::builder()
		.method("GET")
		.uri("/api/simulation")
		.header("authorization", format!("Bearer {token}"))
		.header("partner", "prevcom")
		.body(Body::empty())
		.unwrap();

	let response = router.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn insufficient_permissions_is_forbidden() {
	let upstream = mock_upstream().await;
	let session = sample_session("prevcom", "s-1", "correct-secret", &["CREATE_SIMULATION"]);
	let token = make_token("s-1", "correct-secret");
	let config = base_config(&upstream.uri());
	let router = router_with_store(&config, FakeStore::with(session));

	let request = Request::builder()
		.method("GET")
		.uri("/api/simulation")
		.header("authorization", format!("Bearer {token}"))
		.header("partner", "prevcom")
		.body(Body::empty())
		.unwrap();

	let response = router.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unprotected_route_bypasses_validation_entirely() {
	let upstream = mock_upstream().await;
	let config = base_config(&upstream.uri());
	let router = router_with_store(&config, Arc::new(FakeStore::new()));

	let request = Request::builder()
		.method("GET")
		.uri("/api/public/health")
		.body(Body::empty())
		.unwrap();

	let response = router.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upstream_error_status_is_surfaced_unchanged() {
	// A validated request whose upstream call itself fails gets that
	// status/body passed through verbatim, not rewritten into the
	// gateway's own JSON error envelope (spec §4.11).
	let upstream = mock_upstream().await;
	let mut session = sample_session("prevcom", "s-409", "correct-secret", &["VIEW_SIMULATION_RESULTS"]);
	session.user_info.document_number = "409".to_string();
	let token = make_token("s-409", "correct-secret");
	let config = base_config(&upstream.uri());
	let router = router_with_store(&config, FakeStore::with(session));

	let request = Request::builder()
		.method("GET")
		.uri("/api/simulation")
		.header("authorization", format!("Bearer {token}"))
		.header("partner", "prevcom")
		.body(Body::empty())
		.unwrap();

	let response = router.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::CONFLICT);
	let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
	assert_eq!(&body[..], b"conflict");
}

#[tokio::test]
async fn error_response_carries_a_correlation_id_header() {
	let upstream = mock_upstream().await;
	let config = base_config(&upstream.uri());
	let router = router_with_store(&config, Arc::new(FakeStore::new()));

	let request = Request::builder()
		.method("GET")
		.uri("/api/simulation")
		.header("partner", "prevcom")
		.header("x-correlation-id", "test-correlation-id")
		.body(Body::empty())
		.unwrap();

	let response = router.oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	assert_eq!(
		response.headers().get("x-correlation-id").and_then(|v| v.to_str().ok()),
		Some("test-correlation-id")
	);
}
