//! Client Credentials grant for machine-to-machine tokens.

// self
use crate::{
	_prelude::*,
	flows::{Authority, DEFAULT_SCOPE, TokenResponse},
	grant::BasicCredentials,
	obs::FlowKind,
};

impl Authority {
	/// Authenticates the client with its Basic credentials and mints a client-subject token.
	///
	/// The issued refresh token carries no user.
	pub async fn client_credentials(
		&self,
		credentials: Option<&BasicCredentials>,
	) -> Result<TokenResponse> {
		self.observed(FlowKind::ClientCredentials, "client_credentials", async move {
			let credentials =
				credentials.ok_or_else(|| Error::invalid_client("missing Basic credentials"))?;
			let client = self
				.store
				.fetch_client(&credentials.client_id)
				.await?
				.ok_or_else(|| Error::invalid_client("unknown client"))?;

			if !client.secret.matches(credentials.client_secret.expose()) {
				return Err(Error::invalid_client("secret mismatch"));
			}

			let subject = client.id.to_string();

			self.issue_tokens(client.id, None, &subject, DEFAULT_SCOPE).await
		})
		.await
	}
}
