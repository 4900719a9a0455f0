//! Bounded TTL tables shared by the in-process backends.
//!
//! Each slot carries its own TTL, which [`SlotExpiry`] hands to `moka` so expired entries are
//! evicted in the background and the table never exceeds its capacity. Liveness checks on read
//! use the slot's [`tokio::time::Instant`] deadline, which keeps paused-clock tests exact.

// crates.io
use moka::{Expiry, sync::Cache};
use tokio::time::Instant;
// self
use crate::_prelude::*;

/// Default number of entries per table.
pub const DEFAULT_CAPACITY: u64 = 100_000;

pub(crate) type Table<T> = Cache<String, Slot<T>>;

#[derive(Clone, Debug)]
pub(crate) struct Slot<T> {
	pub(crate) value: T,
	ttl: StdDuration,
	expires_at: Instant,
}
impl<T> Slot<T> {
	pub(crate) fn new(value: T, ttl: StdDuration, now: Instant) -> Self {
		Self { value, ttl, expires_at: now + ttl }
	}

	/// Replaces the value and keeps the current deadline.
	pub(crate) fn retain_deadline<U>(&self, value: U, now: Instant) -> Slot<U> {
		Slot { value, ttl: self.remaining(now), expires_at: self.expires_at }
	}

	pub(crate) fn is_live(&self, now: Instant) -> bool {
		self.expires_at > now
	}

	pub(crate) fn remaining(&self, now: Instant) -> StdDuration {
		self.expires_at.saturating_duration_since(now)
	}
}

struct SlotExpiry;
impl<T> Expiry<String, Slot<T>> for SlotExpiry {
	fn expire_after_create(
		&self,
		_: &String,
		slot: &Slot<T>,
		_: std::time::Instant,
	) -> Option<StdDuration> {
		Some(slot.ttl)
	}

	fn expire_after_update(
		&self,
		_: &String,
		slot: &Slot<T>,
		_: std::time::Instant,
		_: Option<StdDuration>,
	) -> Option<StdDuration> {
		Some(slot.ttl)
	}
}

pub(crate) fn table<T>(capacity: u64) -> Table<T>
where
	T: 'static + Clone + Send + Sync,
{
	Cache::builder().max_capacity(capacity).expire_after(SlotExpiry).build()
}

/// Returns the live slot under `key`, invalidating it if its deadline has passed.
pub(crate) fn live<T>(table: &Table<T>, key: &str, now: Instant) -> Option<Slot<T>>
where
	T: 'static + Clone + Send + Sync,
{
	let slot = table.get(key)?;

	if slot.is_live(now) {
		Some(slot)
	} else {
		table.invalidate(key);

		None
	}
}

/// Flushes pending evictions and returns the number of resident entries.
pub(crate) fn resident<T>(table: &Table<T>) -> u64
where
	T: 'static + Clone + Send + Sync,
{
	table.run_pending_tasks();
	table.entry_count()
}
