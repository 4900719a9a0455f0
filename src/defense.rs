//! Login abuse-defense engine: failed-attempt counters, temporary blocks, and the
//! bidirectional IP↔user association index.
//!
//! Identifiers are opaque strings, either a raw IP or a `user:`-prefixed username (see
//! [`identifier`]). Every backend implements [`Limiter`]; [`DefenseGate`] layers the request
//! timeout and the failure policy on top of it.
//!
//! Backends:
//! - [`MemoryLimiter`] keeps native-atomic state in process.
//! - [`LockingLimiter`] emulates sets and atomic increments over any compare-and-set style
//!   [`KvBackend`] using per-resource locks.
//! - `RedisLimiter` (feature `redis`) relies on native `INCR`, sets, and key expiry.

mod cache;

pub mod gate;
pub mod identifier;
pub mod kv;
pub mod locking;
pub mod memory;
#[cfg(feature = "redis")] pub mod redis;

pub use cache::DEFAULT_CAPACITY;
pub use gate::*;
pub use identifier::IdentifierKind;
pub use kv::*;
pub use locking::*;
pub use memory::MemoryLimiter;
#[cfg(feature = "redis")] pub use redis::RedisLimiter;

// self
use crate::_prelude::*;

/// Boxed future returned by [`Limiter`] operations.
pub type LimiterFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, LimiterError>> + 'a + Send>>;

/// Value returned by [`Limiter::remaining_block_time`] for identifiers without a live block.
pub const NOT_BLOCKED: &str = "not blocked";

/// Abuse-defense contract shared by every backend.
pub trait Limiter
where
	Self: Send + Sync,
{
	/// Increments the failed counter, refreshing its TTL, and blocks the identifier once the
	/// post-increment count reaches the configured maximum. Returns the new count.
	fn record_failed_attempt<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, u32>;

	/// Returns `true` while a live block marker exists.
	fn is_blocked<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, bool>;

	/// Clears counter and block for the identifier and for every identifier associated with it
	/// on the other side of the IP↔user index, then drops the identifier's association record.
	fn reset<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, ()>;

	/// Adds `ip` to the user's IP set and `username` to the IP's user set, refreshing both TTLs.
	fn record_user_ip<'a>(&'a self, username: &'a str, ip: &'a str) -> LimiterFuture<'a, ()>;

	/// IPs associated with `username`; empty when unknown.
	fn ips_for_user<'a>(&'a self, username: &'a str) -> LimiterFuture<'a, Vec<String>>;

	/// Usernames associated with `ip`; empty when unknown.
	fn users_for_ip<'a>(&'a self, ip: &'a str) -> LimiterFuture<'a, Vec<String>>;

	/// Identifiers with a live block marker.
	fn blocked_identifiers(&self) -> LimiterFuture<'_, Vec<String>>;

	/// Human-readable remaining block time, or [`NOT_BLOCKED`].
	fn remaining_block_time<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, String>;

	/// Configured attempt threshold.
	fn max_attempts(&self) -> u32;

	/// Configured block duration.
	fn block_duration(&self) -> StdDuration;
}

/// Error type produced by [`Limiter`] and [`KvBackend`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LimiterError {
	/// The backend failed or was unreachable.
	#[error("Abuse-defense backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A stored value could not be decoded or encoded.
	#[error("Abuse-defense value is malformed: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// The per-resource lock stayed held for every retry.
	#[error("Lock for `{resource}` could not be acquired.")]
	LockContention {
		/// Logical resource the lock protects.
		resource: String,
	},
	/// The operation exceeded the request timeout.
	#[error("Abuse-defense `{operation}` timed out.")]
	Timeout {
		/// Operation label.
		operation: &'static str,
	},
}
impl LimiterError {
	pub(crate) fn backend(err: impl Display) -> Self {
		Self::Backend { message: err.to_string() }
	}

	pub(crate) fn serialization(err: impl Display) -> Self {
		Self::Serialization { message: err.to_string() }
	}
}

/// Thresholds and TTLs shared by every backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LimiterConfig {
	/// Failed attempts that trigger a block.
	pub max_attempts: u32,
	/// Lifetime of a block marker.
	pub block_duration: StdDuration,
	/// Lifetime of a failed-attempt counter, refreshed on every increment.
	pub counter_expiration: StdDuration,
	/// Lifetime of each association set, refreshed on every association write.
	pub association_ttl: StdDuration,
	/// Lifetime of the blocked-identifier index on backends that keep one.
	pub blocked_index_ttl: StdDuration,
}
impl Default for LimiterConfig {
	fn default() -> Self {
		Self {
			max_attempts: 5,
			block_duration: StdDuration::from_secs(30 * 60),
			counter_expiration: StdDuration::from_secs(24 * 60 * 60),
			association_ttl: StdDuration::from_secs(72 * 60 * 60),
			blocked_index_ttl: StdDuration::from_secs(24 * 60 * 60),
		}
	}
}

pub(crate) fn failed_attempts_key(identifier: &str) -> String {
	format!("failed_attempts:{identifier}")
}

pub(crate) fn blocked_key(identifier: &str) -> String {
	format!("blocked:{identifier}")
}

pub(crate) fn user_ips_key(username: &str) -> String {
	format!("user_ips:{username}")
}

pub(crate) fn ip_users_key(ip: &str) -> String {
	format!("ip_users:{ip}")
}

/// Formats a remaining duration as `1h2m3s`, `29m59s`, or `45s`.
pub fn format_remaining(remaining: StdDuration) -> String {
	let secs = remaining.as_secs();
	let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);

	if hours > 0 {
		format!("{hours}h{minutes}m{seconds}s")
	} else if minutes > 0 {
		format!("{minutes}m{seconds}s")
	} else {
		format!("{seconds}s")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn remaining_time_formatting() {
		assert_eq!(format_remaining(StdDuration::from_secs(1800)), "30m0s");
		assert_eq!(format_remaining(StdDuration::from_secs(3723)), "1h2m3s");
		assert_eq!(format_remaining(StdDuration::from_millis(45_900)), "45s");
		assert_eq!(format_remaining(StdDuration::ZERO), "0s");
	}

	#[test]
	fn key_namespace_is_stable() {
		assert_eq!(failed_attempts_key("user:alice"), "failed_attempts:user:alice");
		assert_eq!(blocked_key("9.9.9.9"), "blocked:9.9.9.9");
		assert_eq!(user_ips_key("alice"), "user_ips:alice");
		assert_eq!(ip_users_key("9.9.9.9"), "ip_users:9.9.9.9");
	}
}
