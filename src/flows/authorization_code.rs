//! Authorization-code exchange.
//!
//! The code is fetched and validated first, then claimed atomically. Only the caller whose
//! claim removes the record mints tokens; a concurrent exchange that loses the claim fails with
//! `invalid_grant` even though it passed validation.

// self
use crate::{
	_prelude::*,
	flows::{Authority, TokenResponse},
	obs::FlowKind,
	pkce,
};

impl Authority {
	/// Exchanges an authorization code for an access token and a refresh token.
	pub async fn exchange_authorization_code(
		&self,
		code: &str,
		redirect_uri: &str,
		code_verifier: &str,
	) -> Result<TokenResponse> {
		self.observed(FlowKind::AuthorizationCode, "exchange_authorization_code", async move {
			if code.is_empty() || redirect_uri.is_empty() || code_verifier.is_empty() {
				return Err(Error::invalid_request(
					"code, redirect_uri, and code_verifier are required",
				));
			}

			let record = self
				.store
				.fetch_authorization_code(code)
				.await?
				.ok_or_else(|| Error::invalid_grant("unknown authorization code"))?;

			if record.is_expired_at(OffsetDateTime::now_utc()) {
				return Err(Error::invalid_grant("authorization code expired"));
			}

			let client = self.store.fetch_client(&record.client_id).await?.ok_or_else(|| {
				Error::UnauthorizedClient { reason: format!("client {} is gone", record.client_id) }
			})?;

			if !client.allows_redirect(redirect_uri) || record.redirect_uri != redirect_uri {
				return Err(Error::InvalidRedirectUri);
			}

			pkce::verify(&record.code_challenge, &record.code_challenge_method, code_verifier)
				.map_err(|e| Error::invalid_grant(format!("pkce: {e}")))?;

			let claimed = self
				.store
				.claim_authorization_code(code)
				.await?
				.ok_or_else(|| Error::invalid_grant("authorization code already used"))?;
			let subject = claimed.user_id.to_string();

			self.issue_tokens(claimed.client_id, Some(claimed.user_id), &subject, &claimed.scope)
				.await
		})
		.await
	}
}
