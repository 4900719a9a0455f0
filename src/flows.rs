//! Grant flows and the [`Authority`] that owns their collaborators.

pub mod common;

mod authorization_code;
mod client_credentials;
mod refresh;

pub use common::*;

// self
use crate::{
	_prelude::*,
	defense::DefenseGate,
	grant::{GrantRequest, TokenForm},
	store::CredentialStore,
	token::TokenMinter,
	users::UserProvider,
};

/// Token issuance engine.
///
/// Collaborators are constructed once at start-up and handed in explicitly, so tests can
/// substitute any of them. The authority itself holds no mutable state.
#[derive(Clone)]
pub struct Authority {
	/// Keyed persistence for clients, codes, and refresh tokens.
	pub store: Arc<dyn CredentialStore>,
	/// Access-token minter.
	pub minter: TokenMinter,
	/// User directory consulted by the login path.
	pub users: Arc<dyn UserProvider>,
	/// Abuse-defense gate for the login path; `None` disables rate limiting.
	pub defense: Option<DefenseGate>,
	/// Lifetime of authorization codes issued by [`Authority::login`].
	pub code_ttl: Duration,
	/// Upper bound on one flow, store and directory calls included.
	pub request_timeout: StdDuration,
}
impl Authority {
	/// Default authorization-code lifetime.
	pub const DEFAULT_CODE_TTL: Duration = Duration::minutes(10);
	/// Default bound on one flow.
	pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

	/// Creates an authority without abuse defense.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		minter: TokenMinter,
		users: Arc<dyn UserProvider>,
	) -> Self {
		Self {
			store,
			minter,
			users,
			defense: None,
			code_ttl: Self::DEFAULT_CODE_TTL,
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
		}
	}

	/// Attaches the abuse-defense gate consulted by the login path.
	pub fn with_defense(mut self, gate: DefenseGate) -> Self {
		self.defense = Some(gate);

		self
	}

	/// Overrides the authorization-code lifetime.
	pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
		self.code_ttl = ttl;

		self
	}

	/// Bounds every flow; an expired flow fails with [`Error::Timeout`] and its pending store call
	/// is dropped.
	pub fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Routes a token request to the flow owning its grant type.
	pub async fn dispatch(&self, request: GrantRequest) -> Result<TokenResponse> {
		match request {
			GrantRequest::AuthorizationCode { code, redirect_uri, code_verifier } =>
				self.exchange_authorization_code(&code, &redirect_uri, &code_verifier).await,
			GrantRequest::ClientCredentials { credentials } =>
				self.client_credentials(credentials.as_ref()).await,
			GrantRequest::RefreshToken { refresh_token } => self.refresh(&refresh_token).await,
		}
	}

	/// Selects the grant from a decoded form and dispatches it.
	pub async fn handle_form(&self, form: &TokenForm) -> Result<TokenResponse> {
		let request = GrantRequest::from_form(form)?;

		self.dispatch(request).await
	}
}
impl Debug for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Authority")
			.field("minter", &self.minter)
			.field("defense", &self.defense)
			.field("code_ttl", &self.code_ttl)
			.field("request_timeout", &self.request_timeout)
			.finish_non_exhaustive()
	}
}
