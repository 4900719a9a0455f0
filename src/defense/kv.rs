//! Compare-and-set style key-value contract used by [`crate::defense::LockingLimiter`].

// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	defense::{
		DEFAULT_CAPACITY, LimiterError, LimiterFuture,
		cache::{self, Slot, Table},
	},
};

/// Minimal remote cache surface: no atomic increment, no sets, per-key TTL on write.
pub trait KvBackend
where
	Self: Send + Sync,
{
	/// Reads a live value.
	fn get<'a>(&'a self, key: &'a str) -> LimiterFuture<'a, Option<Vec<u8>>>;

	/// Writes a value unconditionally.
	fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: StdDuration) -> LimiterFuture<'a, ()>;

	/// Writes a value only if the key is absent; returns `false` when it already exists.
	fn add<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: StdDuration)
	-> LimiterFuture<'a, bool>;

	/// Deletes a key; deleting an absent key is not an error.
	fn delete<'a>(&'a self, key: &'a str) -> LimiterFuture<'a, ()>;
}

/// In-process [`KvBackend`] over a bounded `moka` table.
///
/// Expired keys are evicted in the background; reads treat a key as absent once its
/// [`tokio::time::Instant`] deadline has passed.
#[derive(Clone)]
pub struct MemoryKv {
	entries: Table<Vec<u8>>,
	guard: Arc<Mutex<()>>,
}
impl MemoryKv {
	/// Creates a store holding at most `capacity` keys.
	pub fn with_capacity(capacity: u64) -> Self {
		Self { entries: cache::table(capacity), guard: Default::default() }
	}

	/// Number of live keys.
	pub fn len(&self) -> usize {
		let now = Instant::now();

		self.entries.iter().filter(|(_, slot)| slot.is_live(now)).count()
	}

	/// Returns `true` when no live key exists.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns `true` if `key` holds a live value.
	pub fn contains(&self, key: &str) -> bool {
		cache::live(&self.entries, key, Instant::now()).is_some()
	}

	/// Number of resident keys, live or awaiting eviction, after flushing pending evictions.
	pub fn resident(&self) -> u64 {
		cache::resident(&self.entries)
	}
}
impl Default for MemoryKv {
	fn default() -> Self {
		Self::with_capacity(DEFAULT_CAPACITY)
	}
}
impl Debug for MemoryKv {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryKv").field("entries", &self.entries.entry_count()).finish()
	}
}
impl KvBackend for MemoryKv {
	fn get<'a>(&'a self, key: &'a str) -> LimiterFuture<'a, Option<Vec<u8>>> {
		let value = cache::live(&self.entries, key, Instant::now()).map(|slot| slot.value);

		Box::pin(async move { Ok(value) })
	}

	fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: StdDuration) -> LimiterFuture<'a, ()> {
		self.entries.insert(key.to_owned(), Slot::new(value, ttl, Instant::now()));

		Box::pin(async { Ok(()) })
	}

	fn add<'a>(
		&'a self,
		key: &'a str,
		value: Vec<u8>,
		ttl: StdDuration,
	) -> LimiterFuture<'a, bool> {
		let now = Instant::now();
		let stored = {
			let _guard = self.guard.lock();
			let stored = cache::live(&self.entries, key, now).is_none();

			if stored {
				self.entries.insert(key.to_owned(), Slot::new(value, ttl, now));
			}

			stored
		};

		Box::pin(async move { Ok(stored) })
	}

	fn delete<'a>(&'a self, key: &'a str) -> LimiterFuture<'a, ()> {
		self.entries.invalidate(key);

		Box::pin(async { Ok(()) })
	}
}

/// Decodes a JSON-encoded string set; an absent key is an empty set.
pub(crate) fn decode_set(raw: Option<Vec<u8>>) -> Result<Vec<String>, LimiterError> {
	match raw {
		Some(bytes) => {
			let mut deserializer = serde_json::Deserializer::from_slice(&bytes);

			serde_path_to_error::deserialize(&mut deserializer).map_err(LimiterError::serialization)
		},
		None => Ok(Vec::new()),
	}
}

/// Encodes a string set as JSON.
pub(crate) fn encode_set(members: &[String]) -> Result<Vec<u8>, LimiterError> {
	serde_json::to_vec(members).map_err(LimiterError::serialization)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn add_is_conditional_until_expiry() {
		let kv = MemoryKv::default();
		let ttl = StdDuration::from_secs(5);

		assert!(kv.add("lock:x", b"locked".to_vec(), ttl).await.expect("Add should succeed."));
		assert!(!kv.add("lock:x", b"locked".to_vec(), ttl).await.expect("Add should succeed."));

		tokio::time::advance(StdDuration::from_secs(6)).await;

		assert!(kv.add("lock:x", b"locked".to_vec(), ttl).await.expect("Add should succeed."));

		kv.delete("lock:x").await.expect("Delete should succeed.");

		assert!(kv.is_empty());
	}

	#[test]
	fn set_codec_treats_absent_as_empty_and_rejects_garbage() {
		assert!(decode_set(None).expect("Absent set should decode.").is_empty());
		assert_eq!(
			decode_set(Some(encode_set(&["a".into()]).expect("Encoding should succeed.")))
				.expect("Encoded set should decode."),
			vec!["a".to_owned()]
		);
		assert!(matches!(
			decode_set(Some(b"not-json".to_vec())),
			Err(LimiterError::Serialization { .. })
		));
	}

	#[tokio::test]
	async fn expired_keys_do_not_accumulate() {
		let kv = MemoryKv::default();

		for n in 0..2_000 {
			let key = format!("failed_attempts:10.{}.{}.3", n / 256, n % 256);

			kv.set(&key, b"1".to_vec(), StdDuration::from_millis(300))
				.await
				.expect("Set should succeed.");
		}

		assert_eq!(kv.resident(), 2_000);

		tokio::time::sleep(StdDuration::from_millis(600)).await;

		assert_eq!(kv.resident(), 0);
		assert!(kv.is_empty());
	}
}
