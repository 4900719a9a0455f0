//! User provider backed by an external REST directory.
//!
//! Lookups issue `GET {base}/users?username=…` (or `?email=…`). A `404` means the account does
//! not exist; any other non-success status is a backend failure. Passwords are verified locally
//! against the returned bcrypt hash.

// crates.io
use reqwest::{StatusCode, header::AUTHORIZATION};
use url::Url;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	users::{User, UserFuture, UserProvider, UserProviderError},
};

/// REST-backed [`UserProvider`].
#[derive(Clone)]
pub struct RestUserProvider {
	client: reqwest::Client,
	base_url: Url,
	authorization: Option<String>,
}
impl RestUserProvider {
	/// Creates a provider for `base_url`, sending `authorization` verbatim when present.
	pub fn new(base_url: &str, authorization: Option<String>) -> Result<Self, ConfigError> {
		let invalid = |source| ConfigError::InvalidUrl { value: base_url.to_owned(), source };
		let base_url = Url::parse(base_url).map_err(invalid)?;

		if base_url.cannot_be_a_base() {
			return Err(invalid(url::ParseError::RelativeUrlWithCannotBeABaseBase));
		}

		Ok(Self::with_client(reqwest::Client::new(), base_url, authorization))
	}

	/// Creates a provider that reuses a caller-provided client.
	pub fn with_client(client: reqwest::Client, base_url: Url, authorization: Option<String>) -> Self {
		Self { client, base_url, authorization: authorization.filter(|value| !value.is_empty()) }
	}

	fn lookup_url(&self, field: &str, value: &str) -> Url {
		let mut url = self.base_url.clone();

		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty().push("users");
		}

		url.query_pairs_mut().append_pair(field, value);

		url
	}

	async fn lookup(&self, field: &str, value: &str) -> Result<Option<User>, UserProviderError> {
		let backend = |e: reqwest::Error| UserProviderError::Backend { message: e.to_string() };
		let mut request = self.client.get(self.lookup_url(field, value));

		if let Some(authorization) = &self.authorization {
			request = request.header(AUTHORIZATION, authorization);
		}

		let response = request.send().await.map_err(backend)?;
		let status = response.status();

		if status == StatusCode::NOT_FOUND {
			return Ok(None);
		}
		if !status.is_success() {
			return Err(UserProviderError::Backend {
				message: format!("user directory responded with {status}"),
			});
		}

		let body = response.bytes().await.map_err(backend)?;
		let mut deserializer = serde_json::Deserializer::from_slice(&body);
		let user: User = serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
			UserProviderError::Decode { path: e.path().to_string(), message: e.inner().to_string() }
		})?;

		Ok(Some(user))
	}
}
impl UserProvider for RestUserProvider {
	fn find_by_username<'a>(&'a self, username: &'a str) -> UserFuture<'a> {
		Box::pin(self.lookup("username", username))
	}

	fn find_by_email<'a>(&'a self, email: &'a str) -> UserFuture<'a> {
		Box::pin(self.lookup("email", email))
	}
}
impl Debug for RestUserProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RestUserProvider")
			.field("base_url", &self.base_url.as_str())
			.field("authorization_set", &self.authorization.is_some())
			.finish()
	}
}
