//! Request-path wrapper that applies the timeout and failure policy to a [`Limiter`].

// self
use crate::{
	_prelude::*,
	defense::{Limiter, LimiterError, LimiterFuture, format_remaining},
	obs::{self, DefenseEvent},
};

/// What the login path does when the backend fails or times out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
	/// Treat the identifier as not blocked. Favors availability during backend outages.
	#[default]
	Open,
	/// Refuse the login with a server error.
	Closed,
}

/// Outcome of [`DefenseGate::check`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
	/// No identifier is blocked.
	Allowed,
	/// The first blocked identifier found.
	Blocked {
		/// Blocked identifier.
		identifier: String,
		/// Human-readable remaining block time.
		retry_after: String,
	},
}

/// Limiter plus the per-call timeout and failure policy used by the login path.
///
/// [`DefenseGate::check`] applies the policy; the raw [`Limiter`] returned by
/// [`DefenseGate::limiter`] keeps faults distinct from "not blocked".
#[derive(Clone)]
pub struct DefenseGate {
	limiter: Arc<dyn Limiter>,
	timeout: StdDuration,
	policy: FailurePolicy,
}
impl DefenseGate {
	/// Default per-call timeout.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_millis(500);

	/// Wraps `limiter` with the default timeout and fail-open policy.
	pub fn new(limiter: Arc<dyn Limiter>) -> Self {
		Self { limiter, timeout: Self::DEFAULT_TIMEOUT, policy: FailurePolicy::Open }
	}

	/// Overrides the per-call timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the failure policy.
	pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Underlying limiter.
	pub fn limiter(&self) -> &Arc<dyn Limiter> {
		&self.limiter
	}

	/// Configured failure policy.
	pub fn policy(&self) -> FailurePolicy {
		self.policy
	}

	/// Checks each identifier in order and reports the first live block.
	///
	/// A backend fault yields [`GateDecision::Allowed`] under [`FailurePolicy::Open`] and the
	/// fault itself under [`FailurePolicy::Closed`].
	pub async fn check(&self, identifiers: &[&str]) -> Result<GateDecision, LimiterError> {
		for &identifier in identifiers {
			match self.guarded("is_blocked", self.limiter.is_blocked(identifier)).await {
				Ok(true) => {
					let retry_after = self
						.guarded("remaining_block_time", self.limiter.remaining_block_time(identifier))
						.await
						.unwrap_or_else(|_| format_remaining(self.limiter.block_duration()));

					return Ok(GateDecision::Blocked {
						identifier: identifier.to_owned(),
						retry_after,
					});
				},
				Ok(false) => {},
				Err(e) => {
					self.fault("is_blocked", identifier, &e);

					match self.policy {
						FailurePolicy::Open => obs::record_defense_event(DefenseEvent::FailOpen),
						FailurePolicy::Closed => {
							obs::record_defense_event(DefenseEvent::FailClosed);

							return Err(e);
						},
					}
				},
			}
		}

		Ok(GateDecision::Allowed)
	}

	/// Records a failed login for the IP and the user plus their association.
	///
	/// Faults are logged and swallowed.
	pub async fn record_failure(&self, ip: &str, username: &str) {
		let user = crate::defense::identifier::user(username);

		for target in [ip, user.as_str()] {
			match self.guarded("record_failed_attempt", self.limiter.record_failed_attempt(target)).await
			{
				Ok(attempts) => {
					obs::record_defense_event(DefenseEvent::FailedAttempt);
					tracing::info!(identifier = target, attempts, "Failed login attempt recorded.");
				},
				Err(e) => self.fault("record_failed_attempt", target, &e),
			}
		}

		self.associate(ip, username).await;
	}

	/// Records a successful login: refreshes the association, then resets both identifiers.
	///
	/// Faults are logged and swallowed.
	pub async fn record_success(&self, ip: &str, username: &str) {
		let user = crate::defense::identifier::user(username);

		self.associate(ip, username).await;

		for target in [ip, user.as_str()] {
			match self.guarded("reset", self.limiter.reset(target)).await {
				Ok(()) => obs::record_defense_event(DefenseEvent::Reset),
				Err(e) => self.fault("reset", target, &e),
			}
		}
	}

	async fn associate(&self, ip: &str, username: &str) {
		if let Err(e) = self.guarded("record_user_ip", self.limiter.record_user_ip(username, ip)).await
		{
			self.fault("record_user_ip", username, &e);
		}
	}

	async fn guarded<T>(
		&self,
		operation: &'static str,
		call: LimiterFuture<'_, T>,
	) -> Result<T, LimiterError> {
		tokio::time::timeout(self.timeout, call)
			.await
			.unwrap_or(Err(LimiterError::Timeout { operation }))
	}

	fn fault(&self, operation: &'static str, identifier: &str, error: &LimiterError) {
		obs::record_defense_event(DefenseEvent::BackendFault);
		tracing::warn!(operation, identifier, error = %error, "Abuse-defense backend fault.");
	}
}
impl Debug for DefenseGate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DefenseGate")
			.field("timeout", &self.timeout)
			.field("policy", &self.policy)
			.finish_non_exhaustive()
	}
}
