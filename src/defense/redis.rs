//! Redis-backed [`Limiter`] using native atomic commands and key expiry.

// std
use std::sync::LazyLock;
// crates.io
use redis::{AsyncCommands, Client, Script, aio::ConnectionManager};
// self
use crate::{
	_prelude::*,
	defense::{
		IdentifierKind, Limiter, LimiterConfig, LimiterError, LimiterFuture, NOT_BLOCKED,
		blocked_key, failed_attempts_key, format_remaining, identifier, ip_users_key, user_ips_key,
	},
	obs::{self, DefenseEvent},
};

const BLOCK_MARKER: &str = "blocked";

// KEYS[1]: the identifier's association set. ARGV: member name, reverse set prefix, prefix that
// turns a member into an identifier, the identifier itself.
const RESET_LUA: &str = r"
local members = redis.call('SMEMBERS', KEYS[1])
for _, member in ipairs(members) do
	redis.call('SREM', ARGV[2] .. member, ARGV[1])
	local cleared = ARGV[3] .. member
	redis.call('DEL', 'failed_attempts:' .. cleared, 'blocked:' .. cleared)
end
redis.call('DEL', KEYS[1], 'failed_attempts:' .. ARGV[4], 'blocked:' .. ARGV[4])
return members
";

static RESET: LazyLock<Script> = LazyLock::new(|| Script::new(RESET_LUA));

/// Limiter over a Redis connection manager.
///
/// `INCR` and `EXPIRE` run in one `MULTI` pipeline, association sets are native Redis sets, and
/// blocked identifiers are discovered with `KEYS blocked:*`, so no separate index is kept.
#[derive(Clone)]
pub struct RedisLimiter {
	conn: ConnectionManager,
	config: LimiterConfig,
}
impl RedisLimiter {
	/// Connects to `url` and verifies the connection with `PING`.
	pub async fn connect(url: &str, config: LimiterConfig) -> Result<Self, LimiterError> {
		let client = Client::open(url).map_err(LimiterError::backend)?;
		let conn = ConnectionManager::new(client).await.map_err(LimiterError::backend)?;
		let limiter = Self::with_connection(conn, config);

		limiter.ping().await?;

		Ok(limiter)
	}

	/// Wraps an existing connection manager.
	pub fn with_connection(conn: ConnectionManager, config: LimiterConfig) -> Self {
		Self { conn, config }
	}

	/// Round-trips a `PING`.
	pub async fn ping(&self) -> Result<(), LimiterError> {
		let mut conn = self.conn.clone();

		redis::cmd("PING").query_async::<String>(&mut conn).await.map_err(LimiterError::backend)?;

		Ok(())
	}

	fn secs(duration: StdDuration) -> i64 {
		i64::try_from(duration.as_secs()).unwrap_or(i64::MAX).max(1)
	}

	async fn record_failed_attempt_inner(&self, id: &str) -> Result<u32, LimiterError> {
		let mut conn = self.conn.clone();
		let key = failed_attempts_key(id);
		let (attempts,): (u32,) = redis::pipe()
			.atomic()
			.incr(&key, 1)
			.expire(&key, Self::secs(self.config.counter_expiration))
			.ignore()
			.query_async(&mut conn)
			.await
			.map_err(LimiterError::backend)?;

		if attempts >= self.config.max_attempts {
			conn.set_ex::<_, _, ()>(
				blocked_key(id),
				BLOCK_MARKER,
				self.config.block_duration.as_secs().max(1),
			)
			.await
			.map_err(LimiterError::backend)?;
			obs::record_defense_event(DefenseEvent::Blocked);
		}

		Ok(attempts)
	}

	async fn is_blocked_inner(&self, id: &str) -> Result<bool, LimiterError> {
		let mut conn = self.conn.clone();

		conn.exists(blocked_key(id)).await.map_err(LimiterError::backend)
	}

	async fn members(&self, key: String) -> Result<Vec<String>, LimiterError> {
		let mut conn = self.conn.clone();

		conn.smembers(key).await.map_err(LimiterError::backend)
	}

	async fn reset_inner(&self, id: &str) -> Result<(), LimiterError> {
		let mut conn = self.conn.clone();
		let (own_key, member, reverse_prefix, cleared_prefix) = match identifier::parse(id) {
			IdentifierKind::User(username) =>
				(user_ips_key(username), username, ip_users_key(""), ""),
			IdentifierKind::Ip(ip) =>
				(ip_users_key(ip), ip, user_ips_key(""), identifier::USER_PREFIX),
		};

		RESET
			.key(own_key)
			.arg(member)
			.arg(reverse_prefix)
			.arg(cleared_prefix)
			.arg(id)
			.invoke_async::<Vec<String>>(&mut conn)
			.await
			.map(|_| ())
			.map_err(LimiterError::backend)
	}

	async fn record_user_ip_inner(&self, username: &str, ip: &str) -> Result<(), LimiterError> {
		let mut conn = self.conn.clone();
		let ttl = Self::secs(self.config.association_ttl);
		let user_key = user_ips_key(username);
		let ip_key = ip_users_key(ip);

		redis::pipe()
			.atomic()
			.sadd(&user_key, ip)
			.ignore()
			.expire(&user_key, ttl)
			.ignore()
			.sadd(&ip_key, username)
			.ignore()
			.expire(&ip_key, ttl)
			.ignore()
			.query_async::<()>(&mut conn)
			.await
			.map_err(LimiterError::backend)
	}

	async fn blocked_identifiers_inner(&self) -> Result<Vec<String>, LimiterError> {
		let mut conn = self.conn.clone();
		let keys: Vec<String> = conn.keys("blocked:*").await.map_err(LimiterError::backend)?;
		let mut identifiers = keys
			.into_iter()
			.filter_map(|key| key.strip_prefix("blocked:").map(str::to_owned))
			.collect::<Vec<_>>();

		identifiers.sort();

		Ok(identifiers)
	}

	async fn remaining_block_time_inner(&self, id: &str) -> Result<String, LimiterError> {
		let mut conn = self.conn.clone();
		let ttl: i64 = conn.ttl(blocked_key(id)).await.map_err(LimiterError::backend)?;

		match u64::try_from(ttl) {
			Ok(secs) => Ok(format_remaining(StdDuration::from_secs(secs))),
			Err(_) => Ok(NOT_BLOCKED.to_owned()),
		}
	}
}
impl Limiter for RedisLimiter {
	fn record_failed_attempt<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, u32> {
		Box::pin(self.record_failed_attempt_inner(identifier))
	}

	fn is_blocked<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, bool> {
		Box::pin(self.is_blocked_inner(identifier))
	}

	fn reset<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, ()> {
		Box::pin(self.reset_inner(identifier))
	}

	fn record_user_ip<'a>(&'a self, username: &'a str, ip: &'a str) -> LimiterFuture<'a, ()> {
		Box::pin(self.record_user_ip_inner(username, ip))
	}

	fn ips_for_user<'a>(&'a self, username: &'a str) -> LimiterFuture<'a, Vec<String>> {
		Box::pin(self.members(user_ips_key(username)))
	}

	fn users_for_ip<'a>(&'a self, ip: &'a str) -> LimiterFuture<'a, Vec<String>> {
		Box::pin(self.members(ip_users_key(ip)))
	}

	fn blocked_identifiers(&self) -> LimiterFuture<'_, Vec<String>> {
		Box::pin(self.blocked_identifiers_inner())
	}

	fn remaining_block_time<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, String> {
		Box::pin(self.remaining_block_time_inner(identifier))
	}

	fn max_attempts(&self) -> u32 {
		self.config.max_attempts
	}

	fn block_duration(&self) -> StdDuration {
		self.config.block_duration
	}
}
impl Debug for RedisLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RedisLimiter").field("config", &self.config).finish_non_exhaustive()
	}
}
