//! Circuit Breaker Registry (spec §4.4): named breakers, each running its
//! own CLOSED → OPEN → HALF_OPEN → CLOSED state machine over a sliding
//! window of call outcomes. No teacher or pack repo carries a circuit
//! breaker; this is built directly from the state-machine description in
//! spec §4.4 and §7 (see DESIGN.md).

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::GatewayError;

/// Thresholds and windows governing one named breaker (spec §4.4 table).
#[derive(Debug, Clone, Copy)]
pub struct Policy {
	pub failure_rate_threshold: f64,
	pub open_wait: Duration,
	pub window: usize,
	pub min_calls: usize,
	pub half_open_probes: usize,
	pub slow_rate_threshold: f64,
	pub slow_call_duration: Duration,
}

impl Policy {
	pub const DEFAULT: Policy = Policy {
		failure_rate_threshold: 0.50,
		open_wait: Duration::from_secs(30),
		window: 10,
		min_calls: 5,
		half_open_probes: 3,
		slow_rate_threshold: 0.50,
		slow_call_duration: Duration::from_secs(2),
	};

	pub const REDIS: Policy = Policy {
		failure_rate_threshold: 0.70,
		open_wait: Duration::from_secs(15),
		window: 20,
		min_calls: 10,
		half_open_probes: 5,
		slow_rate_threshold: 0.60,
		slow_call_duration: Duration::from_secs(1),
	};

	pub const DOWNSTREAM: Policy = Policy {
		failure_rate_threshold: 0.60,
		open_wait: Duration::from_secs(45),
		window: 15,
		min_calls: 8,
		half_open_probes: 4,
		slow_rate_threshold: 0.70,
		slow_call_duration: Duration::from_secs(5),
	};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
	Success,
	Failure,
	Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	Closed,
	Open,
	HalfOpen,
}

struct Inner {
	state: State,
	opened_at: Option<Instant>,
	window: VecDeque<Outcome>,
	half_open_calls: usize,
	half_open_successes: usize,
}

/// One named circuit breaker. Cheap to clone (wraps an `Arc`); the
/// registry hands out clones so call sites don't need to hold a lock
/// across an `.await`.
pub struct Breaker {
	name: String,
	policy: Policy,
	inner: Mutex<Inner>,
}

impl Breaker {
	fn new(name: impl Into<String>, policy: Policy) -> Self {
		Breaker {
			name: name.into(),
			policy,
			inner: Mutex::new(Inner {
				state: State::Closed,
				opened_at: None,
				window: VecDeque::with_capacity(policy.window),
				half_open_calls: 0,
				half_open_successes: 0,
			}),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// True if the breaker is currently rejecting calls.
	pub fn is_open(&self) -> bool {
		matches!(self.inner.lock().state, State::Open)
	}

	/// Runs `f`, provided the breaker currently admits calls, and records
	/// the outcome (including whether the call was slow) against the
	/// sliding window. Rejections while OPEN or past the HALF_OPEN probe
	/// budget surface as [`GatewayError::breaker_open`] carrying this
	/// breaker's name, so the Error Mapper can distinguish `redis` from
	/// `downstream` (spec §4.4, §4.10).
	pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, GatewayError>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, GatewayError>>,
	{
		self.admit()?;

		let start = Instant::now();
		let result = f().await;
		let elapsed = start.elapsed();

		let outcome = match &result {
			Ok(_) if elapsed >= self.policy.slow_call_duration => Outcome::Slow,
			Ok(_) => Outcome::Success,
			Err(_) => Outcome::Failure,
		};
		self.record(outcome);

		result
	}

	fn admit(&self) -> Result<(), GatewayError> {
		let mut inner = self.inner.lock();
		match inner.state {
			State::Closed => Ok(()),
			State::Open => {
				let opened_at = inner.opened_at.unwrap_or_else(Instant::now);
				if opened_at.elapsed() >= self.policy.open_wait {
					inner.state = State::HalfOpen;
					inner.half_open_calls = 0;
					inner.half_open_successes = 0;
					Ok(())
				} else {
					Err(GatewayError::breaker_open(&self.name))
				}
			}
			State::HalfOpen => {
				if inner.half_open_calls < self.policy.half_open_probes {
					Ok(())
				} else {
					Err(GatewayError::breaker_open(&self.name))
				}
			}
		}
	}

	fn record(&self, outcome: Outcome) {
		let mut inner = self.inner.lock();
		match inner.state {
			State::Closed => {
				inner.window.push_back(outcome);
				if inner.window.len() > self.policy.window {
					inner.window.pop_front();
				}
				if inner.window.len() >= self.policy.min_calls {
					let total = inner.window.len() as f64;
					let failures =
						inner.window.iter().filter(|o| **o == Outcome::Failure).count() as f64;
					let slows =
						inner.window.iter().filter(|o| **o == Outcome::Slow).count() as f64;
					if failures / total >= self.policy.failure_rate_threshold
						|| slows / total >= self.policy.slow_rate_threshold
					{
						inner.state = State::Open;
						inner.opened_at = Some(Instant::now());
						inner.window.clear();
					}
				}
			}
			State::HalfOpen => {
				inner.half_open_calls += 1;
				match outcome {
					Outcome::Success => {
						inner.half_open_successes += 1;
						if inner.half_open_successes >= self.policy.half_open_probes {
							inner.state = State::Closed;
							inner.window.clear();
						}
					}
					Outcome::Failure | Outcome::Slow => {
						inner.state = State::Open;
						inner.opened_at = Some(Instant::now());
						inner.window.clear();
					}
				}
			}
			State::Open => {
				// `admit` never lets a call through while open; nothing to record.
			}
		}
	}
}

/// Process-wide named map of breakers, initialized once at startup with
/// the three policies from spec §4.4 plus `default` (spec §9, "circuit
/// breaker registry").
pub struct Registry {
	breakers: HashMap<String, Arc<Breaker>>,
}

impl Registry {
	pub fn new() -> Self {
		let mut breakers = HashMap::new();
		breakers.insert("default".to_string(), Arc::new(Breaker::new("default", Policy::DEFAULT)));
		breakers.insert("redis".to_string(), Arc::new(Breaker::new("redis", Policy::REDIS)));
		breakers.insert(
			"downstream".to_string(),
			Arc::new(Breaker::new("downstream", Policy::DOWNSTREAM)),
		);
		Registry { breakers }
	}

	/// Returns the named breaker, or `default` if `name` is not one of
	/// the registered policies.
	pub fn breaker(&self, name: &str) -> Arc<Breaker> {
		self.breakers
			.get(name)
			.cloned()
			.unwrap_or_else(|| self.breakers["default"].clone())
	}
}

impl Default for Registry {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn ok() -> Result<(), GatewayError> {
		Ok(())
	}

	async fn fail() -> Result<(), GatewayError> {
		Err(GatewayError::Internal("boom".into()))
	}

	#[tokio::test]
	async fn opens_after_failure_rate_exceeded() {
		let breaker = Breaker::new("redis", Policy::REDIS);
		// REDIS: min_calls=10, failure_rate_threshold=0.70
		for _ in 0..3 {
			let _ = breaker.call(ok).await;
		}
		for _ in 0..7 {
			let _ = breaker.call(fail).await;
		}
		assert!(breaker.is_open());
	}

	#[tokio::test]
	async fn rejects_calls_while_open() {
		let breaker = Breaker::new("downstream", Policy::DOWNSTREAM);
		for _ in 0..8 {
			let _ = breaker.call(fail).await;
		}
		assert!(breaker.is_open());
		let result = breaker.call(ok).await;
		assert!(matches!(result, Err(GatewayError::DownstreamUnavailable(_))));
	}

	#[tokio::test]
	async fn stays_closed_under_threshold() {
		let breaker = Breaker::new("default", Policy::DEFAULT);
		for _ in 0..4 {
			let _ = breaker.call(ok).await;
		}
		let _ = breaker.call(fail).await;
		assert!(!breaker.is_open());
	}

	#[test]
	fn registry_falls_back_to_default_policy() {
		let registry = Registry::new();
		let breaker = registry.breaker("unknown-policy");
		assert_eq!(breaker.name(), "default");
	}
}
