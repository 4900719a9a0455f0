//! Native-atomic in-process [`Limiter`].
//!
//! Each operation runs under one short mutex section, which plays the role of a backend with
//! atomic increments, native sets, and per-key expiry. Expiry uses [`tokio::time::Instant`] so
//! paused-clock tests can advance time deterministically.

// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	defense::{
		DEFAULT_CAPACITY, IdentifierKind, Limiter, LimiterConfig, LimiterFuture, NOT_BLOCKED,
		cache::{self, Slot, Table},
		format_remaining, identifier,
	},
	obs::{self, DefenseEvent},
};

type Members = BTreeSet<String>;

struct State {
	guard: Mutex<()>,
	counters: Table<u32>,
	blocks: Table<()>,
	user_ips: Table<Members>,
	ip_users: Table<Members>,
}
impl State {
	fn new(capacity: u64) -> Self {
		Self {
			guard: Mutex::new(()),
			counters: cache::table(capacity),
			blocks: cache::table(capacity),
			user_ips: cache::table(capacity),
			ip_users: cache::table(capacity),
		}
	}

	fn clear(&self, identifier: &str) {
		self.counters.invalidate(identifier);
		self.blocks.invalidate(identifier);
	}

	fn members(sets: &Table<Members>, key: &str, now: Instant) -> Vec<String> {
		cache::live(sets, key, now).map(|slot| slot.value.into_iter().collect()).unwrap_or_default()
	}

	fn add_member(sets: &Table<Members>, key: &str, member: &str, ttl: StdDuration, now: Instant) {
		let mut members = cache::live(sets, key, now).map(|slot| slot.value).unwrap_or_default();

		members.insert(member.to_owned());
		sets.insert(key.to_owned(), Slot::new(members, ttl, now));
	}

	fn remove_member(sets: &Table<Members>, key: &str, member: &str, now: Instant) {
		let Some(slot) = cache::live(sets, key, now) else { return };
		let mut members = slot.value.clone();

		if !members.remove(member) {
			return;
		}
		if members.is_empty() {
			sets.invalidate(key);
		} else {
			sets.insert(key.to_owned(), slot.retain_deadline(members, now));
		}
	}
}
impl Debug for State {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("State")
			.field("counters", &self.counters.entry_count())
			.field("blocks", &self.blocks.entry_count())
			.field("user_ips", &self.user_ips.entry_count())
			.field("ip_users", &self.ip_users.entry_count())
			.finish()
	}
}

/// In-process limiter with exact remaining block times.
///
/// Tables are bounded `moka` caches: expired entries are evicted in the background and each
/// table holds at most its capacity.
#[derive(Clone, Debug)]
pub struct MemoryLimiter {
	config: LimiterConfig,
	state: Arc<State>,
}
impl MemoryLimiter {
	/// Creates a limiter with the provided thresholds and [`DEFAULT_CAPACITY`] entries per table.
	pub fn new(config: LimiterConfig) -> Self {
		Self::with_capacity(config, DEFAULT_CAPACITY)
	}

	/// Creates a limiter whose tables hold at most `capacity` entries each.
	pub fn with_capacity(config: LimiterConfig, capacity: u64) -> Self {
		Self { config, state: Arc::new(State::new(capacity)) }
	}

	/// Number of resident entries across all tables, after flushing pending evictions.
	pub fn resident_entries(&self) -> u64 {
		let state = &self.state;

		cache::resident(&state.counters)
			+ cache::resident(&state.blocks)
			+ cache::resident(&state.user_ips)
			+ cache::resident(&state.ip_users)
	}

	fn record_failed_attempt_now(&self, identifier: &str) -> u32 {
		let now = Instant::now();
		let state = &self.state;
		let _guard = state.guard.lock();
		let attempts = cache::live(&state.counters, identifier, now)
			.map_or(0, |slot| slot.value)
			.saturating_add(1);

		state
			.counters
			.insert(identifier.to_owned(), Slot::new(attempts, self.config.counter_expiration, now));

		if attempts >= self.config.max_attempts {
			state
				.blocks
				.insert(identifier.to_owned(), Slot::new((), self.config.block_duration, now));
			obs::record_defense_event(DefenseEvent::Blocked);
		}

		attempts
	}

	fn reset_now(&self, id: &str) {
		let now = Instant::now();
		let state = &self.state;
		let _guard = state.guard.lock();

		state.clear(id);

		match identifier::parse(id) {
			IdentifierKind::User(username) => {
				for ip in State::members(&state.user_ips, username, now) {
					state.clear(&ip);
					State::remove_member(&state.ip_users, &ip, username, now);
				}

				state.user_ips.invalidate(username);
			},
			IdentifierKind::Ip(ip) => {
				for username in State::members(&state.ip_users, ip, now) {
					state.clear(&identifier::user(&username));
					State::remove_member(&state.user_ips, &username, ip, now);
				}

				state.ip_users.invalidate(ip);
			},
		}
	}

	fn record_user_ip_now(&self, username: &str, ip: &str) {
		let now = Instant::now();
		let ttl = self.config.association_ttl;
		let state = &self.state;
		let _guard = state.guard.lock();

		State::add_member(&state.user_ips, username, ip, ttl, now);
		State::add_member(&state.ip_users, ip, username, ttl, now);
	}

	fn members_now(&self, sets: &Table<Members>, key: &str) -> Vec<String> {
		let _guard = self.state.guard.lock();

		State::members(sets, key, Instant::now())
	}

	fn is_blocked_now(&self, identifier: &str) -> bool {
		cache::live(&self.state.blocks, identifier, Instant::now()).is_some()
	}

	fn blocked_identifiers_now(&self) -> Vec<String> {
		let now = Instant::now();
		let mut identifiers = self
			.state
			.blocks
			.iter()
			.filter(|(_, slot)| slot.is_live(now))
			.map(|(identifier, _)| String::clone(&identifier))
			.collect::<Vec<_>>();

		identifiers.sort();

		identifiers
	}

	fn remaining_now(&self, identifier: &str) -> String {
		let now = Instant::now();

		match cache::live(&self.state.blocks, identifier, now) {
			Some(slot) => format_remaining(slot.remaining(now)),
			None => NOT_BLOCKED.to_owned(),
		}
	}
}
impl Default for MemoryLimiter {
	fn default() -> Self {
		Self::new(LimiterConfig::default())
	}
}
impl Limiter for MemoryLimiter {
	fn record_failed_attempt<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, u32> {
		let attempts = self.record_failed_attempt_now(identifier);

		Box::pin(async move { Ok(attempts) })
	}

	fn is_blocked<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, bool> {
		let blocked = self.is_blocked_now(identifier);

		Box::pin(async move { Ok(blocked) })
	}

	fn reset<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, ()> {
		self.reset_now(identifier);

		Box::pin(async { Ok(()) })
	}

	fn record_user_ip<'a>(&'a self, username: &'a str, ip: &'a str) -> LimiterFuture<'a, ()> {
		self.record_user_ip_now(username, ip);

		Box::pin(async { Ok(()) })
	}

	fn ips_for_user<'a>(&'a self, username: &'a str) -> LimiterFuture<'a, Vec<String>> {
		let ips = self.members_now(&self.state.user_ips, username);

		Box::pin(async move { Ok(ips) })
	}

	fn users_for_ip<'a>(&'a self, ip: &'a str) -> LimiterFuture<'a, Vec<String>> {
		let users = self.members_now(&self.state.ip_users, ip);

		Box::pin(async move { Ok(users) })
	}

	fn blocked_identifiers(&self) -> LimiterFuture<'_, Vec<String>> {
		let identifiers = self.blocked_identifiers_now();

		Box::pin(async move { Ok(identifiers) })
	}

	fn remaining_block_time<'a>(&'a self, identifier: &'a str) -> LimiterFuture<'a, String> {
		let remaining = self.remaining_now(identifier);

		Box::pin(async move { Ok(remaining) })
	}

	fn max_attempts(&self) -> u32 {
		self.config.max_attempts
	}

	fn block_duration(&self) -> StdDuration {
		self.config.block_duration
	}
}
