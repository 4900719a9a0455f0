//! Registered relying-party clients.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, Secret},
};

/// Client registration as seen by the core: read-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
	/// Client identifier.
	pub id: ClientId,
	/// Shared secret used by the client-credentials grant.
	pub secret: Secret,
	/// Redirect URIs registered for the authorization-code grant.
	pub redirect_uris: Vec<String>,
}
impl Client {
	/// Creates a client without registered redirect URIs.
	pub fn new(id: ClientId, secret: impl Into<String>) -> Self {
		Self { id, secret: Secret::new(secret), redirect_uris: Vec::new() }
	}

	/// Registers an additional redirect URI.
	pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
		self.redirect_uris.push(uri.into());

		self
	}

	/// Returns `true` if the URI exactly matches a registered redirect URI.
	pub fn allows_redirect(&self, uri: &str) -> bool {
		self.redirect_uris.iter().any(|registered| registered == uri)
	}
}
