//! Refresh Token grant.
//!
//! Refresh tokens are neither rotated nor expired: a successful refresh returns the presented
//! token unchanged.

// self
use crate::{
	_prelude::*,
	flows::{Authority, DEFAULT_SCOPE, TokenResponse},
	obs::FlowKind,
};

impl Authority {
	/// Mints a new access token from a stored refresh token.
	pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
		self.observed(FlowKind::Refresh, "refresh", async move {
			if refresh_token.is_empty() {
				return Err(Error::invalid_request("refresh_token is required"));
			}

			let record = self
				.store
				.fetch_refresh_token(refresh_token)
				.await?
				.ok_or_else(|| Error::invalid_grant("unknown refresh token"))?;
			let issued = self.minter.mint(record.subject(), DEFAULT_SCOPE).await?;

			Ok(TokenResponse {
				access_token: issued.access_token,
				token_type: "bearer".into(),
				expires_in: issued.expires_in,
				refresh_token: record.token.expose().to_owned(),
			})
		})
		.await
	}
}
