//! Refresh tokens minted alongside access tokens.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, Secret, UserId},
};

/// Refresh token record. `user_id` is `None` for client-credentials tokens.
///
/// Refresh tokens are neither expired nor rotated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshToken {
	/// Opaque token value.
	pub token: Secret,
	/// Client the token is bound to.
	pub client_id: ClientId,
	/// End user the token is bound to, if any.
	pub user_id: Option<UserId>,
	/// Issuance instant.
	pub issued_at: OffsetDateTime,
}
impl RefreshToken {
	/// Generates a fresh refresh token for the client/user pair.
	pub fn issue(client_id: ClientId, user_id: Option<UserId>) -> Self {
		Self { token: Secret::generate(), client_id, user_id, issued_at: OffsetDateTime::now_utc() }
	}

	/// Subject for access tokens minted from this refresh token.
	pub fn subject(&self) -> &str {
		self.user_id.as_deref().unwrap_or(self.client_id.as_ref())
	}
}
