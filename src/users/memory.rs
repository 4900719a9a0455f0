//! In-process user directory with bcrypt-hashed passwords.

// self
use crate::{
	_prelude::*,
	auth::UserId,
	users::{User, UserFuture, UserProvider, UserProviderError},
};

/// User provider keeping accounts in memory, keyed by username.
#[derive(Clone, Debug)]
pub struct MemoryUserProvider {
	users: Arc<RwLock<HashMap<String, User>>>,
	hash_cost: u32,
}
impl MemoryUserProvider {
	/// Creates an empty directory hashing with bcrypt's default cost.
	pub fn new() -> Self {
		Self { users: Default::default(), hash_cost: bcrypt::DEFAULT_COST }
	}

	/// Overrides the bcrypt cost used by [`MemoryUserProvider::register`].
	pub fn with_hash_cost(mut self, cost: u32) -> Self {
		self.hash_cost = cost;

		self
	}

	/// Inserts or replaces an account whose password is already hashed.
	pub fn insert(&self, user: User) {
		self.users.write().insert(user.username.clone(), user);
	}

	/// Hashes `password` and stores a new account.
	pub fn register(
		&self,
		id: UserId,
		username: impl Into<String>,
		email: impl Into<String>,
		password: &str,
	) -> Result<User, UserProviderError> {
		let password_hash = bcrypt::hash(password, self.hash_cost)
			.map_err(|e| UserProviderError::Hash { message: e.to_string() })?;
		let user = User { id, username: username.into(), email: email.into(), password_hash };

		self.insert(user.clone());

		Ok(user)
	}
}
impl Default for MemoryUserProvider {
	fn default() -> Self {
		Self::new()
	}
}
impl UserProvider for MemoryUserProvider {
	fn find_by_username<'a>(&'a self, username: &'a str) -> UserFuture<'a> {
		let user = self.users.read().get(username).cloned();

		Box::pin(async move { Ok(user) })
	}

	fn find_by_email<'a>(&'a self, email: &'a str) -> UserFuture<'a> {
		let user = self.users.read().values().find(|user| user.email == email).cloned();

		Box::pin(async move { Ok(user) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn lookups_and_password_verification() {
		let provider = MemoryUserProvider::new().with_hash_cost(4);
		let user = provider
			.register(
				UserId::new("u-1").expect("User fixture should be valid."),
				"alice",
				"alice@example.com",
				"hunter2",
			)
			.expect("Registration should succeed.");

		assert_ne!(user.password_hash, "hunter2");

		let by_name = provider.find_by_username("alice").await.expect("Lookup should succeed.");
		let by_mail =
			provider.find_by_email("alice@example.com").await.expect("Lookup should succeed.");

		assert_eq!(by_name.as_ref(), Some(&user));
		assert_eq!(by_mail.as_ref(), Some(&user));
		assert!(provider.find_by_username("bob").await.expect("Lookup should succeed.").is_none());
		assert!(provider.verify_password(&user.password_hash, "hunter2").expect("Hash is valid."));
		assert!(!provider.verify_password(&user.password_hash, "hunter3").expect("Hash is valid."));
		assert!(provider.verify_password("not-a-hash", "hunter2").is_err());
	}
}
