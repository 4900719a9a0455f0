//! Shared pieces of the grant flows: the token response and token issuance.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, RefreshToken, UserId},
	flows::Authority,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Scope granted by the client-credentials and refresh flows.
pub const DEFAULT_SCOPE: &str = "default";

/// Successful token endpoint body.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Signed JWT.
	pub access_token: String,
	/// Always `bearer`.
	pub token_type: String,
	/// Access-token lifetime in seconds.
	pub expires_in: i64,
	/// Opaque refresh token.
	pub refresh_token: String,
}
impl Debug for TokenResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenResponse")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.finish_non_exhaustive()
	}
}

impl Authority {
	/// Mints an access token for `subject` and persists a fresh refresh token bound to the
	/// client/user pair.
	pub(crate) async fn issue_tokens(
		&self,
		client_id: ClientId,
		user_id: Option<UserId>,
		subject: &str,
		scope: &str,
	) -> Result<TokenResponse> {
		let issued = self.minter.mint(subject, scope).await?;
		let refresh = RefreshToken::issue(client_id, user_id);
		let refresh_token = refresh.token.expose().to_owned();

		self.store.save_refresh_token(refresh).await?;

		Ok(TokenResponse {
			access_token: issued.access_token,
			token_type: "bearer".into(),
			expires_in: issued.expires_in,
			refresh_token,
		})
	}

	/// Runs `fut` inside a flow span, bounded by [`Authority::request_timeout`], and records
	/// attempt plus outcome.
	pub(crate) async fn observed<T, F>(
		&self,
		kind: FlowKind,
		stage: &'static str,
		fut: F,
	) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let span = FlowSpan::new(kind, stage);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = tokio::time::timeout(self.request_timeout, span.instrument(fut))
			.await
			.unwrap_or(Err(Error::Timeout { stage }));

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(e) => {
				obs::record_flow_outcome(kind, FlowOutcome::Failure);
				tracing::debug!(flow = kind.as_str(), stage, code = e.code(), "Flow failed.");
			},
		}

		result
	}
}
