//! User-credential provider contract plus in-memory and REST-backed implementations.

pub mod memory;
#[cfg(feature = "reqwest")] pub mod rest;

pub use memory::MemoryUserProvider;
#[cfg(feature = "reqwest")] pub use rest::RestUserProvider;

// self
use crate::{_prelude::*, auth::UserId};

/// Boxed future returned by [`UserProvider`] lookups.
pub type UserFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Option<User>, UserProviderError>> + 'a + Send>>;

/// Looks up end users and verifies their passwords.
pub trait UserProvider
where
	Self: Send + Sync,
{
	/// Finds a user by username.
	fn find_by_username<'a>(&'a self, username: &'a str) -> UserFuture<'a>;

	/// Finds a user by e-mail address.
	fn find_by_email<'a>(&'a self, email: &'a str) -> UserFuture<'a>;

	/// Checks `password` against a stored bcrypt hash.
	fn verify_password(&self, password_hash: &str, password: &str) -> Result<bool, UserProviderError> {
		bcrypt::verify(password, password_hash)
			.map_err(|e| UserProviderError::Hash { message: e.to_string() })
	}
}

/// End-user account as returned by a provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	/// Stable user identifier placed in `sub`.
	pub id: UserId,
	/// Login name.
	pub username: String,
	/// E-mail address.
	#[serde(default)]
	pub email: String,
	/// bcrypt hash.
	pub password_hash: String,
}
impl Debug for User {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("User")
			.field("id", &self.id)
			.field("username", &self.username)
			.field("email", &self.email)
			.finish_non_exhaustive()
	}
}

/// Error type produced by [`UserProvider`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum UserProviderError {
	/// The backing directory could not be reached or answered unexpectedly.
	#[error("User backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// The backing directory returned a payload that does not decode.
	#[error("User payload is invalid at `{path}`: {message}.")]
	Decode {
		/// JSON path of the offending field.
		path: String,
		/// Human-readable error payload.
		message: String,
	},
	/// Hashing or hash verification failed.
	#[error("Password hash failure: {message}.")]
	Hash {
		/// Human-readable error payload.
		message: String,
	},
}
