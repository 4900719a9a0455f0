//! [`Limiter`] emulation over a compare-and-set style [`KvBackend`].
//!
//! The backend offers no atomic increment and no sets, so every read-modify-write runs under a
//! `lock:<resource>` key created with [`KvBackend::add`]. Acquisition retries with jittered
//! backoff at most [`LockConfig::max_retries`] times and the lock is deleted once the protected
//! section finishes, whatever its outcome, provided the key still holds this holder's token. A
//! cancelled section leaves the lock to expire with its TTL.
//!
//! Only association writes hold two locks at once, always the user-side set before the IP-side
//! set, so lock acquisition cannot form a cycle.
//!
//! Sets (association index and blocked-identifier index) are JSON-encoded string lists. The
//! blocked index can go stale when block markers expire, so [`Limiter::blocked_identifiers`]
//! revalidates each entry and rewrites the index if it shrank.

// crates.io
use rand::Rng;
use tokio::task::JoinHandle;
// self
use crate::{
	_prelude::*,
	defense::{
		IdentifierKind, KvBackend, Limiter, LimiterConfig, LimiterError, LimiterFuture,
		NOT_BLOCKED, blocked_key, failed_attempts_key, identifier, ip_users_key,
		kv::{decode_set, encode_set},
		user_ips_key,
	},
	obs::{self, DefenseEvent},
};

const BLOCKED_INDEX_KEY: &str = "blocked_identifiers_list";
const BLOCK_MARKER: &[u8] = b"blocked";

/// Default period of [`LockingLimiter::spawn_index_sweeper`].
pub const DEFAULT_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(30 * 60);

/// Per-resource lock tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockConfig {
	/// Lifetime of a lock key; bounds how long a crashed holder can block others.
	pub ttl: StdDuration,
	/// Base delay between acquisition attempts. Up to half of it is added as jitter.
	pub retry_delay: StdDuration,
	/// Retries after the first failed acquisition.
	pub max_retries: u32,
}
impl LockConfig {
	/// Longest time one acquisition can spend backing off, jitter included.
	pub fn worst_case_wait(&self) -> StdDuration {
		(self.retry_delay + self.retry_delay / 2).saturating_mul(self.max_retries)
	}
}
impl Default for LockConfig {
	fn default() -> Self {
		Self {
			ttl: StdDuration::from_secs(5),
			retry_delay: StdDuration::from_millis(25),
			max_retries: 12,
		}
	}
}

/// Lock-emulating limiter for backends without native atomic primitives.
#[derive(Debug)]
pub struct LockingLimiter<B> {
	backend: B,
	config: LimiterConfig,
	lock: LockConfig,
}
impl<B> LockingLimiter<B>
where
	B: KvBackend,
{
	/// Creates a limiter over `backend` with default lock tuning.
	pub fn new(backend: B, config: LimiterConfig) -> Self {
		Self { backend, config, lock: LockConfig::default() }
	}

	/// Overrides the lock tuning.
	pub fn with_lock_config(mut self, lock: LockConfig) -> Self {
		self.lock = lock;

		self
	}

	/// Underlying key-value backend.
	pub fn backend(&self) -> &B {
		&self.backend
	}

	async fn locked<T, F>(&self, resource: &str, section: F) -> Result<T, LimiterError>
	where
		F: Future<Output = Result<T, LimiterError>>,
	{
		let lock_key = format!("lock:{resource}");
		let token = format!("{:032x}", rand::rng().random::<u128>()).into_bytes();

		self.acquire(&lock_key, resource, &token).await?;

		let result = section.await;

		self.release(&lock_key, resource, &token).await;

		result
	}

	async fn acquire(
		&self,
		lock_key: &str,
		resource: &str,
		token: &[u8],
	) -> Result<(), LimiterError> {
		for attempt in 0..=self.lock.max_retries {
			if self.backend.add(lock_key, token.to_vec(), self.lock.ttl).await? {
				return Ok(());
			}
			if attempt < self.lock.max_retries {
				tokio::time::sleep(self.backoff()).await;
			}
		}

		tracing::warn!(resource, retries = self.lock.max_retries, "Lock acquisition gave up.");

		Err(LimiterError::LockContention { resource: resource.to_owned() })
	}

	/// Deletes the lock only while it still holds `token`; an expired lock may already belong to
	/// the next holder.
	async fn release(&self, lock_key: &str, resource: &str, token: &[u8]) {
		match self.backend.get(lock_key).await {
			Ok(Some(current)) if current == token => {
				if let Err(e) = self.backend.delete(lock_key).await {
					tracing::warn!(resource, error = %e, "Lock release failed; it will expire.");
				}
			},
			Ok(_) => tracing::warn!(resource, "Lock expired before release."),
			Err(e) => tracing::warn!(resource, error = %e, "Lock release failed; it will expire."),
		}
	}

	fn backoff(&self) -> StdDuration {
		let base = self.lock.retry_delay;
		let spread = u64::try_from(base.as_millis() / 2).unwrap_or(u64::MAX);
		let jitter = if spread == 0 { 0 } else { rand::rng().random_range(0..=spread) };

		base + StdDuration::from_millis(jitter)
	}

	async fn increment(&self, id: &str) -> Result<u32, LimiterError> {
		let key = failed_attempts_key(id);

		self.locked(&key, async {
			let current = match self.backend.get(&key).await? {
				Some(raw) => std::str::from_utf8(&raw)
					.map_err(LimiterError::serialization)?
					.parse::<u32>()
					.map_err(LimiterError::serialization)?,
				None => 0,
			};
			let attempts = current.saturating_add(1);

			self.backend
				.set(&key, attempts.to_string().into_bytes(), self.config.counter_expiration)
				.await?;

			Ok(attempts)
		})
		.await
	}

	/// Applies `mutate` to the set under `key`; `mutate` returns `false` to skip the write.
	/// Empty sets are deleted rather than stored. The caller holds the lock on `key`.
	async fn write_set<F>(&self, key: &str, ttl: StdDuration, mutate: F) -> Result<(), LimiterError>
	where
		F: FnOnce(&mut Vec<String>) -> bool,
	{
		let mut members = decode_set(self.backend.get(key).await?)?;

		if !mutate(&mut members) {
			return Ok(());
		}
		if members.is_empty() {
			self.backend.delete(key).await
		} else {
			self.backend.set(key, encode_set(&members)?, ttl).await
		}
	}

	async fn mutate_set<F>(&self, key: &str, ttl: StdDuration, mutate: F) -> Result<(), LimiterError>
	where
		F: FnOnce(&mut Vec<String>) -> bool,
	{
		self.locked(key, self.write_set(key, ttl, mutate)).await
	}

	/// Runs `section` holding the user-side lock, then the IP-side lock, of one association.
	async fn associated<T, F>(
		&self,
		username: &str,
		ip: &str,
		section: F,
	) -> Result<T, LimiterError>
	where
		F: Future<Output = Result<T, LimiterError>>,
	{
		let user_key = user_ips_key(username);
		let ip_key = ip_users_key(ip);

		self.locked(&user_key, self.locked(&ip_key, section)).await
	}

	async fn link(&self, username: &str, ip: &str) -> Result<(), LimiterError> {
		let ttl = self.config.association_ttl;

		self.write_set(&user_ips_key(username), ttl, with_member(ip)).await?;
		self.write_set(&ip_users_key(ip), ttl, with_member(username)).await
	}

	async fn unlink(&self, username: &str, ip: &str) -> Result<(), LimiterError> {
		let ttl = self.config.association_ttl;

		self.write_set(&user_ips_key(username), ttl, without_member(ip)).await?;
		self.write_set(&ip_users_key(ip), ttl, without_member(username)).await
	}

	async fn index_add(&self, id: &str) -> Result<(), LimiterError> {
		self.mutate_set(BLOCKED_INDEX_KEY, self.config.blocked_index_ttl, |members| {
			if members.iter().any(|existing| existing == id) {
				return false;
			}

			members.push(id.to_owned());

			true
		})
		.await
	}

	async fn index_remove(&self, ids: &[String]) -> Result<(), LimiterError> {
		self.mutate_set(BLOCKED_INDEX_KEY, self.config.blocked_index_ttl, |members| {
			let before = members.len();

			members.retain(|existing| !ids.contains(existing));

			members.len() != before
		})
		.await
	}

	async fn members(&self, key: &str) -> Result<Vec<String>, LimiterError> {
		decode_set(self.backend.get(key).await?)
	}

	async fn record_failed_attempt_inner(&self, id: &str) -> Result<u32, LimiterError> {
		let attempts = self.increment(id).await?;

		if attempts >= self.config.max_attempts {
			self.backend.set(&blocked_key(id), BLOCK_MARKER.to_vec(), self.config.block_duration).await?;
			obs::record_defense_event(DefenseEvent::Blocked);

			if let Err(e) = self.index_add(id).await {
				tracing::warn!(identifier = id, error = %e, "Blocked index update failed.");
			}
		}

		Ok(attempts)
	}

	async fn is_blocked_inner(&self, id: &str) -> Result<bool, LimiterError> {
		Ok(self.backend.get(&blocked_key(id)).await?.is_some())
	}

	async fn reset_inner(&self, id: &str) -> Result<(), LimiterError> {
		let mut cleared = vec![id.to_owned()];

		match identifier::parse(id) {
			IdentifierKind::User(username) => {
				let user_key = user_ips_key(username);
				let ips = self
					.locked(&user_key, async {
						let ips = self.members(&user_key).await?;

						for ip in &ips {
							let ip_key = ip_users_key(ip);
							let unlink = self.write_set(
								&ip_key,
								self.config.association_ttl,
								without_member(username),
							);

							self.locked(&ip_key, unlink).await?;
						}

						self.backend.delete(&user_key).await?;

						Ok(ips)
					})
					.await?;

				cleared.extend(ips);
			},
			IdentifierKind::Ip(ip) => {
				let users = self.members(&ip_users_key(ip)).await?;

				// Unlinking empties `ip_users:<ip>`; pairs linked after the read stay consistent.
				for username in &users {
					self.associated(username, ip, self.unlink(username, ip)).await?;
				}

				cleared.extend(users.iter().map(|username| identifier::user(username)));
			},
		}

		for target in &cleared {
			self.backend.delete(&failed_attempts_key(target)).await?;
			self.backend.delete(&blocked_key(target)).await?;
		}

		if let Err(e) = self.index_remove(&cleared).await {
			tracing::warn!(identifier = id, error = %e, "Blocked index update failed.");
		}

		Ok(())
	}

	async fn record_user_ip_inner(&self, username: &str, ip: &str) -> Result<(), LimiterError> {
		self.associated(username, ip, self.link(username, ip)).await
	}

	async fn blocked_identifiers_inner(&self) -> Result<Vec<String>, LimiterError> {
		self.locked(BLOCKED_INDEX_KEY, async {
			let listed = self.members(BLOCKED_INDEX_KEY).await?;
			let mut live = Vec::with_capacity(listed.len());

			for id in &listed {
				match self.backend.get(&blocked_key(id)).await {
					Ok(Some(_)) => live.push(id.clone()),
					Ok(None) => {},
					Err(e) => {
						tracing::warn!(identifier = %id, error = %e, "Block marker check failed.");
						live.push(id.clone());
					},
				}
			}

			if live.len() != listed.len() {
				if live.is_empty() {
					self.backend.delete(BLOCKED_INDEX_KEY).await?;
				} else {
					self.backend
						.set(BLOCKED_INDEX_KEY, encode_set(&live)?, self.config.blocked_index_ttl)
						.await?;
				}
			}

			Ok(live)
		})
		.await
	}

	async fn remaining_block_time_inner(&self, id: &str) -> Result<String, LimiterError> {
		if !self.is_blocked_inner(id).await? {
			return Ok(NOT_BLOCKED.to_owned());
		}

		Ok(format!("~{} minutes", self.config.block_duration.as_secs() / 60))
	}
}

fn with_member(member: &str) -> impl FnOnce(&mut Vec<String>) -> bool + '_ {
	move |members| {
		if !members.iter().any(|existing| existing == member) {
			members.push(member.to_owned());
		}

		true
	}
}

fn without_member(member: &str) -> impl FnOnce(&mut Vec<String>) -> bool + '_ {
	move |members| {
		let before = members.len();

		members.retain(|existing| existing != member);

		members.len() != before
	}
}

impl<B> LockingLimiter<B>
where
	B: 'static + KvBackend,
{
	/// Spawns a task that heals the blocked index every `period`.
	///
	/// The task holds a weak reference and stops once the limiter is dropped.
	pub fn spawn_index_sweeper(self: &Arc<Self>, period: StdDuration) -> JoinHandle<()> {
		let limiter = Arc::downgrade(self);
		let period = period.max(StdDuration::from_millis(1));

		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(period);

			ticker.tick().await;

			loop {
				ticker.tick().await;

				let Some(limiter) = limiter.upgrade() else { break };

				match limiter.blocked_identifiers_inner().await {
					Ok(live) => tracing::debug!(live = live.len(), "Blocked index swept."),
					Err(e) => tracing::warn!(error = %e, "Blocked index sweep failed."),
				}
			}
		})
	}
}
impl<B> Limiter for LockingLimiter<B>
where
	B: KvBackend,
{
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
		Box::pin(async move { self.members(&user_ips_key(username)).await })
	}

	fn users_for_ip<'a>(&'a self, ip: &'a str) -> LimiterFuture<'a, Vec<String>> {
		Box::pin(async move { self.members(&ip_users_key(ip)).await })
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

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::defense::MemoryKv;

	/// Yields to the scheduler before every operation so concurrent sections interleave.
	#[derive(Clone, Default)]
	struct YieldingKv(MemoryKv);
	impl KvBackend for YieldingKv {
		fn get<'a>(&'a self, key: &'a str) -> LimiterFuture<'a, Option<Vec<u8>>> {
			Box::pin(async move {
				tokio::task::yield_now().await;

				self.0.get(key).await
			})
		}

		fn set<'a>(
			&'a self,
			key: &'a str,
			value: Vec<u8>,
			ttl: StdDuration,
		) -> LimiterFuture<'a, ()> {
			Box::pin(async move {
				tokio::task::yield_now().await;

				self.0.set(key, value, ttl).await
			})
		}

		fn add<'a>(
			&'a self,
			key: &'a str,
			value: Vec<u8>,
			ttl: StdDuration,
		) -> LimiterFuture<'a, bool> {
			Box::pin(async move {
				tokio::task::yield_now().await;

				self.0.add(key, value, ttl).await
			})
		}

		fn delete<'a>(&'a self, key: &'a str) -> LimiterFuture<'a, ()> {
			Box::pin(async move {
				tokio::task::yield_now().await;

				self.0.delete(key).await
			})
		}
	}

	fn limiter(kv: &MemoryKv) -> LockingLimiter<MemoryKv> {
		LockingLimiter::new(kv.clone(), LimiterConfig { max_attempts: 2, ..Default::default() })
	}

	async fn assert_symmetric<B>(limiter: &LockingLimiter<B>, users: &[&str], ips: &[&str])
	where
		B: KvBackend,
	{
		for user in users {
			for ip in ips {
				let forward = limiter.ips_for_user(user).await.expect("Lookup should succeed.");
				let reverse = limiter.users_for_ip(ip).await.expect("Lookup should succeed.");

				assert_eq!(
					forward.iter().any(|known| known == ip),
					reverse.iter().any(|known| known == user),
					"{user} and {ip} must be linked in both directions or neither.",
				);
			}
		}
	}

	#[tokio::test(start_paused = true)]
	async fn contended_lock_gives_up_after_bounded_retries() {
		let kv = MemoryKv::default();
		let limiter = limiter(&kv).with_lock_config(LockConfig {
			ttl: StdDuration::from_secs(60),
			retry_delay: StdDuration::from_millis(10),
			max_retries: 3,
		});

		kv.add("lock:failed_attempts:9.9.9.9", b"held".to_vec(), StdDuration::from_secs(60))
			.await
			.expect("Seeding the lock should succeed.");

		let err = limiter
			.record_failed_attempt("9.9.9.9")
			.await
			.expect_err("A held lock must surface contention.");

		assert_eq!(err, LimiterError::LockContention { resource: "failed_attempts:9.9.9.9".into() });
		assert!(!kv.contains("failed_attempts:9.9.9.9"));
	}

	#[tokio::test(start_paused = true)]
	async fn expired_lock_taken_over_is_not_released_by_previous_holder() {
		let kv = MemoryKv::default();
		let limiter = limiter(&kv).with_lock_config(LockConfig {
			ttl: StdDuration::from_secs(1),
			..Default::default()
		});

		limiter
			.locked("resource", async {
				tokio::time::advance(StdDuration::from_secs(2)).await;

				let taken = kv
					.add("lock:resource", b"next-holder".to_vec(), StdDuration::from_secs(60))
					.await
					.expect("Taking the expired lock should succeed.");

				assert!(taken, "The expired lock should be free for the next holder.");

				Ok(())
			})
			.await
			.expect("The section should complete.");

		assert_eq!(
			kv.get("lock:resource").await.expect("Lock read should succeed."),
			Some(b"next-holder".to_vec())
		);
	}

	#[test]
	fn default_lock_budget_fits_in_the_default_timeout() {
		assert!(LockConfig::default().worst_case_wait() < StdDuration::from_millis(500));
	}

	#[tokio::test(start_paused = true)]
	async fn interleaved_resets_and_records_keep_associations_symmetric() {
		let limiter = LockingLimiter::new(YieldingKv::default(), LimiterConfig::default());

		for (user, ip) in [("alice", "1.1.1.1"), ("alice", "2.2.2.2"), ("bob", "2.2.2.2")] {
			limiter.record_user_ip(user, ip).await.expect("Seeding should succeed.");
		}

		let (reset_user, record_alice, record_bob, reset_ip) = tokio::join!(
			limiter.reset("user:alice"),
			limiter.record_user_ip("alice", "3.3.3.3"),
			limiter.record_user_ip("bob", "1.1.1.1"),
			limiter.reset("2.2.2.2"),
		);

		reset_user.expect("User reset should succeed.");
		record_alice.expect("Recording should succeed.");
		record_bob.expect("Recording should succeed.");
		reset_ip.expect("IP reset should succeed.");

		assert_symmetric(&limiter, &["alice", "bob"], &["1.1.1.1", "2.2.2.2", "3.3.3.3"]).await;
		assert!(limiter.users_for_ip("2.2.2.2").await.expect("Lookup should succeed.").is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn lock_is_released_after_failed_section() {
		let kv = MemoryKv::default();
		let limiter = limiter(&kv);

		kv.set("failed_attempts:9.9.9.9", b"garbage".to_vec(), StdDuration::from_secs(60))
			.await
			.expect("Seeding should succeed.");

		assert!(matches!(
			limiter.record_failed_attempt("9.9.9.9").await,
			Err(LimiterError::Serialization { .. })
		));
		assert!(!kv.contains("lock:failed_attempts:9.9.9.9"));
	}

	#[tokio::test(start_paused = true)]
	async fn stale_index_entries_are_dropped_and_rewritten() {
		let kv = MemoryKv::default();
		let limiter = LockingLimiter::new(
			kv.clone(),
			LimiterConfig { max_attempts: 1, block_duration: StdDuration::from_secs(60), ..Default::default() },
		);

		limiter.record_failed_attempt("1.1.1.1").await.expect("Recording should succeed.");
		tokio::time::advance(StdDuration::from_secs(30)).await;
		limiter.record_failed_attempt("2.2.2.2").await.expect("Recording should succeed.");
		tokio::time::advance(StdDuration::from_secs(31)).await;

		assert_eq!(
			limiter.blocked_identifiers().await.expect("Listing should succeed."),
			vec!["2.2.2.2".to_owned()]
		);

		let stored = kv
			.get(BLOCKED_INDEX_KEY)
			.await
			.expect("Index read should succeed.")
			.expect("Index should still exist.");

		assert_eq!(decode_set(Some(stored)).expect("Index should decode."), vec!["2.2.2.2".to_owned()]);
	}

	#[tokio::test(start_paused = true)]
	async fn remaining_time_is_an_approximation() {
		let kv = MemoryKv::default();
		let limiter = limiter(&kv);

		assert_eq!(limiter.remaining_block_time("9.9.9.9").await.expect("Query should succeed."), NOT_BLOCKED);

		limiter.record_failed_attempt("9.9.9.9").await.expect("Recording should succeed.");
		limiter.record_failed_attempt("9.9.9.9").await.expect("Recording should succeed.");

		assert_eq!(
			limiter.remaining_block_time("9.9.9.9").await.expect("Query should succeed."),
			"~30 minutes"
		);
	}

	#[tokio::test(start_paused = true)]
	async fn sweeper_heals_index_in_background() {
		let kv = MemoryKv::default();
		let limiter = Arc::new(LockingLimiter::new(
			kv.clone(),
			LimiterConfig { max_attempts: 1, block_duration: StdDuration::from_secs(60), ..Default::default() },
		));

		limiter.record_failed_attempt("1.1.1.1").await.expect("Recording should succeed.");

		let sweeper = limiter.spawn_index_sweeper(StdDuration::from_secs(120));

		tokio::time::sleep(StdDuration::from_secs(121)).await;

		assert!(!kv.contains(BLOCKED_INDEX_KEY));

		drop(limiter);
		tokio::time::sleep(StdDuration::from_secs(121)).await;

		assert!(sweeper.is_finished());
	}
}
