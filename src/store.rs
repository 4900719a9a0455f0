//! Credential store contract and the built-in in-memory implementation.

pub mod memory;

pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{AuthorizationCode, Client, RefreshToken},
};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Keyed persistence for clients, authorization codes, and refresh tokens.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Fetches a registered client.
	fn fetch_client<'a>(&'a self, client_id: &'a str) -> StoreFuture<'a, Option<Client>>;

	/// Persists a freshly issued authorization code.
	fn save_authorization_code(&self, code: AuthorizationCode) -> StoreFuture<'_, ()>;

	/// Fetches an authorization code without consuming it.
	fn fetch_authorization_code<'a>(
		&'a self,
		code: &'a str,
	) -> StoreFuture<'a, Option<AuthorizationCode>>;

	/// Atomically removes an authorization code, returning it only to the single caller that
	/// removed it.
	fn claim_authorization_code<'a>(
		&'a self,
		code: &'a str,
	) -> StoreFuture<'a, Option<AuthorizationCode>>;

	/// Persists a refresh token.
	fn save_refresh_token(&self, token: RefreshToken) -> StoreFuture<'_, ()>;

	/// Fetches a refresh token.
	fn fetch_refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<RefreshToken>>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
