#![allow(dead_code)]

// std
use std::sync::Arc;
// self
use oauth2_authority::{
	auth::{AuthorizationCode, Client, ClientId, RefreshToken, UserId},
	defense::{DefenseGate, LimiterConfig, MemoryLimiter},
	flows::Authority,
	login::{LoginGrant, LoginRequest},
	store::{CredentialStore, MemoryStore, StoreError, StoreFuture},
	token::TokenMinter,
	users::MemoryUserProvider,
};
use time::Duration;

pub const CLIENT_ID: &str = "app";
pub const CLIENT_SECRET: &str = "app-secret";
pub const REDIRECT_URI: &str = "https://app/cb";
pub const JWT_SECRET: &str = "integration-secret";
pub const AUDIENCE: &str = "oauth2-authority";
pub const USER_ID: &str = "u-alice";
pub const USERNAME: &str = "alice";
pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "correct horse";
/// Verifier sent when exchanging a code issued without PKCE.
pub const PLAIN_VERIFIER: &str = "v";

pub struct Fixture {
	pub authority: Authority,
	pub store: MemoryStore,
	pub users: MemoryUserProvider,
}

pub fn fixture() -> Fixture {
	let store = MemoryStore::default();

	store.insert_client(
		Client::new(
			ClientId::new(CLIENT_ID).expect("Client fixture identifier should be valid."),
			CLIENT_SECRET,
		)
		.with_redirect_uri(REDIRECT_URI),
	);

	let users = MemoryUserProvider::new().with_hash_cost(4);

	users
		.register(
			UserId::new(USER_ID).expect("User fixture identifier should be valid."),
			USERNAME,
			EMAIL,
			PASSWORD,
		)
		.expect("User fixture should register.");

	let minter = TokenMinter::new(JWT_SECRET, AUDIENCE, Duration::hours(1));
	let authority = Authority::new(Arc::new(store.clone()), minter, Arc::new(users.clone()));

	Fixture { authority, store, users }
}

pub fn defended_fixture(config: LimiterConfig) -> Fixture {
	let Fixture { authority, store, users } = fixture();
	let gate = DefenseGate::new(Arc::new(MemoryLimiter::new(config)));

	Fixture { authority: authority.with_defense(gate), store, users }
}

pub fn login_request(identifier: &str, password: &str, ip: &str) -> LoginRequest {
	LoginRequest {
		identifier: identifier.into(),
		password: password.into(),
		client_id: CLIENT_ID.into(),
		redirect_uri: REDIRECT_URI.into(),
		code_challenge: String::new(),
		code_challenge_method: String::new(),
		scope: "openid".into(),
		ip: ip.into(),
	}
}

pub fn pkce_login_request(challenge: &str) -> LoginRequest {
	LoginRequest {
		code_challenge: challenge.into(),
		code_challenge_method: "S256".into(),
		..login_request(USERNAME, PASSWORD, "10.0.0.1")
	}
}

pub async fn login(authority: &Authority, request: LoginRequest) -> LoginGrant {
	authority.login(request).await.expect("Fixture login should succeed.")
}

/// Delegates to a [`MemoryStore`] but yields to the scheduler between every step of an
/// exchange, so concurrent exchanges all fetch the code before any of them claims it.
#[derive(Clone)]
pub struct InterleavingStore(pub MemoryStore);
impl CredentialStore for InterleavingStore {
	fn fetch_client<'a>(&'a self, client_id: &'a str) -> StoreFuture<'a, Option<Client>> {
		Box::pin(async move {
			tokio::task::yield_now().await;

			self.0.fetch_client(client_id).await
		})
	}

	fn save_authorization_code(&self, code: AuthorizationCode) -> StoreFuture<'_, ()> {
		self.0.save_authorization_code(code)
	}

	fn fetch_authorization_code<'a>(
		&'a self,
		code: &'a str,
	) -> StoreFuture<'a, Option<AuthorizationCode>> {
		Box::pin(async move {
			let record = self.0.fetch_authorization_code(code).await;

			tokio::task::yield_now().await;

			record
		})
	}

	fn claim_authorization_code<'a>(
		&'a self,
		code: &'a str,
	) -> StoreFuture<'a, Option<AuthorizationCode>> {
		Box::pin(async move {
			tokio::task::yield_now().await;

			self.0.claim_authorization_code(code).await
		})
	}

	fn save_refresh_token(&self, token: RefreshToken) -> StoreFuture<'_, ()> {
		self.0.save_refresh_token(token)
	}

	fn fetch_refresh_token<'a>(&'a self, token: &'a str) -> StoreFuture<'a, Option<RefreshToken>> {
		self.0.fetch_refresh_token(token)
	}
}

fn stalled<'a, T>() -> StoreFuture<'a, T>
where
	T: 'a + Send,
{
	Box::pin(std::future::pending::<Result<T, StoreError>>())
}

/// Store whose operations never complete.
pub struct StalledStore;
impl CredentialStore for StalledStore {
	fn fetch_client<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<Client>> {
		stalled()
	}

	fn save_authorization_code(&self, _: AuthorizationCode) -> StoreFuture<'_, ()> {
		stalled()
	}

	fn fetch_authorization_code<'a>(
		&'a self,
		_: &'a str,
	) -> StoreFuture<'a, Option<AuthorizationCode>> {
		stalled()
	}

	fn claim_authorization_code<'a>(
		&'a self,
		_: &'a str,
	) -> StoreFuture<'a, Option<AuthorizationCode>> {
		stalled()
	}

	fn save_refresh_token(&self, _: RefreshToken) -> StoreFuture<'_, ()> {
		stalled()
	}

	fn fetch_refresh_token<'a>(&'a self, _: &'a str) -> StoreFuture<'a, Option<RefreshToken>> {
		stalled()
	}
}
