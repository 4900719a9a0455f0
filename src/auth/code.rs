//! Authorization codes issued by the login path and consumed once by the code exchange.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, Secret, UserId},
};

/// Authorization code record owned by the credential store.
///
/// `code_challenge` and `code_challenge_method` are empty strings when the client did not use
/// PKCE.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
	/// Opaque code value.
	pub code: Secret,
	/// Client the code was issued to.
	pub client_id: ClientId,
	/// Redirect URI supplied at authorization time.
	pub redirect_uri: String,
	/// Authenticated end user.
	pub user_id: UserId,
	/// PKCE challenge, or empty.
	pub code_challenge: String,
	/// PKCE challenge method, or empty.
	pub code_challenge_method: String,
	/// Scope requested at authorization time.
	pub scope: String,
	/// Expiry instant.
	pub expires_at: OffsetDateTime,
}
impl AuthorizationCode {
	/// Returns `true` once `instant` is strictly after the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant > self.expires_at
	}

	/// Returns `true` when the code was bound to a PKCE challenge.
	pub fn requires_pkce(&self) -> bool {
		!self.code_challenge.is_empty() && !self.code_challenge_method.is_empty()
	}
}
impl Debug for AuthorizationCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationCode")
			.field("code", &self.code)
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri)
			.field("user_id", &self.user_id)
			.field("code_challenge_method", &self.code_challenge_method)
			.field("scope", &self.scope)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
