//! CLI entrypoint for the session-validating reverse proxy. Mirrors the
//! teacher's `--config`/`--file`/`--validate-only` duality: configuration
//! can be supplied inline or as a path, and can be checked without
//! starting the listener.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gateway_core::breaker::Registry as BreakerRegistry;
use gateway_core::config::{parse_config, Config};
use gateway_core::proxy::{build_router, ReqwestUpstreamClient};
use gateway_core::store::RedisSessionStore;
use gateway_core::telemetry::actuator::actuator_router;
use gateway_core::telemetry::log::init_tracing;
use prometheus_client::registry::Registry as MetricsRegistry;
use redis::aio::ConnectionManager;

#[derive(Parser, Debug)]
#[command(name = "session-gateway", version, about = "Session-validating reverse proxy")]
struct Args {
	/// Inline YAML configuration.
	#[arg(long, conflicts_with = "file")]
	config: Option<String>,

	/// Path to a YAML configuration file.
	#[arg(long, conflicts_with = "config")]
	file: Option<String>,

	/// Parse and validate configuration, then exit without starting the listener.
	#[arg(long)]
	validate_only: bool,

	/// Address to bind the HTTP listener to.
	#[arg(long, default_value = "0.0.0.0:8080")]
	listen: SocketAddr,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let config = load_config(&args)?;

	init_tracing(config.json_logs);

	if args.validate_only {
		tracing::info!(service = %config.service_name, routes = config.routes.len(), "configuration is valid");
		return Ok(());
	}

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.context("failed to build tokio runtime")?;

	runtime.block_on(run(config, args.listen))
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
	let yaml = match (&args.config, &args.file) {
		(Some(inline), None) => inline.clone(),
		(None, Some(path)) => {
			fs_err::read_to_string(path).with_context(|| format!("reading config file {path}"))?
		}
		_ => anyhow::bail!("exactly one of --config or --file must be provided"),
	};
	parse_config(&yaml).context("parsing configuration")
}

async fn run(config: Config, listen: SocketAddr) -> anyhow::Result<()> {
	let breakers = Arc::new(BreakerRegistry::new());

	let redis_client = redis::Client::open(config.redis.connection_url())
		.context("building redis client")?;
	let connection = ConnectionManager::new(redis_client)
		.await
		.context("connecting to session store")?;
	let store: Arc<dyn gateway_core::store::SessionStoreClient> =
		Arc::new(RedisSessionStore::new(connection, breakers.clone()));

	let upstream = Arc::new(ReqwestUpstreamClient::new());

	// Every metric the Metrics Filter records carries the common
	// `application=<service-name>` tag (spec §6) via a labeled
	// sub-registry; the parent registry is what `/metrics` later encodes.
	let mut metrics_registry = MetricsRegistry::default();
	let app = {
		let service_registry = metrics_registry
			.sub_registry_with_label((std::borrow::Cow::Borrowed("application"), config.service_name.clone().into()));
		build_router(&config, store, upstream, breakers, service_registry)
	};

	let management_addr: SocketAddr = format!("{}:{}", config.management.host, config.management.port)
		.parse()
		.context("parsing management listen address")?;
	let management_listener = tokio::net::TcpListener::bind(management_addr)
		.await
		.with_context(|| format!("binding management listener on {management_addr}"))?;
	let management_app = actuator_router(metrics_registry);
	tokio::spawn(async move {
		if let Err(err) = axum::serve(management_listener, management_app).await {
			tracing::error!(error = %err, "actuator listener terminated unexpectedly");
		}
	});

	tracing::info!(
		address = %listen,
		management_address = %management_addr,
		service = %config.service_name,
		"starting gateway listener"
	);
	let listener = tokio::net::TcpListener::bind(listen)
		.await
		.with_context(|| format!("binding listener on {listen}"))?;

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await
		.context("gateway listener terminated unexpectedly")?;

	Ok(())
}

async fn shutdown_signal() {
	let _ = tokio::signal::ctrl_c().await;
	tracing::info!("shutdown signal received, draining in-flight requests");
}
