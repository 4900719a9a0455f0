//! Thread-safe in-memory [`CredentialStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{AuthorizationCode, Client, ClientId, RefreshToken},
	store::{CredentialStore, StoreFuture},
};

#[derive(Debug, Default)]
struct Tables {
	clients: HashMap<ClientId, Client>,
	codes: HashMap<String, AuthorizationCode>,
	refresh_tokens: HashMap<String, RefreshToken>,
}

/// Thread-safe storage backend that keeps records in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Tables>>);
impl MemoryStore {
	/// Registers or replaces a client.
	pub fn insert_client(&self, client: Client) {
		self.0.write().clients.insert(client.id.clone(), client);
	}

	/// Returns the number of authorization codes still awaiting exchange.
	pub fn pending_codes(&self) -> usize {
		self.0.read().codes.len()
	}

	/// Returns the number of stored refresh tokens.
	pub fn refresh_token_count(&self) -> usize {
		self.0.read().refresh_tokens.len()
	}
}
impl CredentialStore for MemoryStore {
	fn fetch_client<'a>(&'a self, client_id: &'a str) -> StoreFuture<'a, Option<Client>> {
		let client = self.0.read().clients.get(client_id).cloned();

		Box::pin(async move { Ok(client) })
	}

	fn save_authorization_code(&self, code: AuthorizationCode) -> StoreFuture<'_, ()> {
		self.0.write().codes.insert(code.code.expose().to_owned(), code);

		Box::pin(async { Ok(()) })
	}

	fn fetch_authorization_code<'a>(
		&'a self,
		code: &'a str,
	) -> StoreFuture<'a, Option<AuthorizationCode>> {
		let record = self.0.read().codes.get(code).cloned();

		Box::pin(async move { Ok(record) })
	}

	fn claim_authorization_code<'a>(
		&'a self,
		code: &'a str,
	) -> StoreFuture<'a, Option<AuthorizationCode>> {
		let claimed = self.0.write().codes.remove(code);

		Box::pin(async move { Ok(claimed) })
	}

	fn save_refresh_token(&self, token: RefreshToken) -> StoreFuture<'_, ()> {
		self.0.write().refresh_tokens.insert(token.token.expose().to_owned(), token);

		Box::pin(async { Ok(()) })
	}

	fn fetch_refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<RefreshToken>> {
		let record = self.0.read().refresh_tokens.get(token).cloned();

		Box::pin(async move { Ok(record) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::{Secret, UserId};

	fn code(value: &str) -> AuthorizationCode {
		AuthorizationCode {
			code: Secret::new(value),
			client_id: ClientId::new("app").expect("Client fixture should be valid."),
			redirect_uri: "https://app/cb".into(),
			user_id: UserId::new("alice").expect("User fixture should be valid."),
			code_challenge: String::new(),
			code_challenge_method: String::new(),
			scope: "openid".into(),
			expires_at: OffsetDateTime::now_utc() + Duration::minutes(10),
		}
	}

	#[tokio::test]
	async fn claim_removes_exactly_once() {
		let store = MemoryStore::default();

		store.save_authorization_code(code("C1")).await.expect("Saving the code should succeed.");

		let first = store.claim_authorization_code("C1").await.expect("Claim should succeed.");
		let second = store.claim_authorization_code("C1").await.expect("Claim should succeed.");

		assert!(first.is_some());
		assert!(second.is_none());
		assert_eq!(store.pending_codes(), 0);
	}
}
