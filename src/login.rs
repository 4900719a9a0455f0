//! Interactive login: authenticates an end user and issues an authorization code.
//!
//! The account is looked up first and the abuse-defense gate runs before the password check,
//! so a blocked identifier is refused without touching the password hash. Defense state is
//! keyed on the resolved username whether the form named the account by username or e-mail;
//! the typed identifier stands in only when no account matches. Failed logins are counted
//! against both the IP and the `user:` identifier; a successful login resets both.

// self
use crate::{
	_prelude::*,
	auth::{AuthorizationCode, ClientId, Secret},
	defense::{GateDecision, identifier},
	flows::{Authority, DEFAULT_SCOPE},
	obs::FlowKind,
	users::User,
};

/// Login form submitted by the end user.
#[derive(Clone)]
pub struct LoginRequest {
	/// Username, or e-mail address when it contains `@`.
	pub identifier: String,
	/// Plain-text password.
	pub password: String,
	/// Client the code is requested for.
	pub client_id: String,
	/// Redirect URI the code is delivered to.
	pub redirect_uri: String,
	/// PKCE challenge, or empty.
	pub code_challenge: String,
	/// PKCE challenge method, or empty.
	pub code_challenge_method: String,
	/// Requested scope; empty means [`DEFAULT_SCOPE`].
	pub scope: String,
	/// Client-visible IP of the caller.
	pub ip: String,
}
impl Debug for LoginRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginRequest")
			.field("identifier", &self.identifier)
			.field("client_id", &self.client_id)
			.field("redirect_uri", &self.redirect_uri)
			.field("code_challenge_method", &self.code_challenge_method)
			.field("scope", &self.scope)
			.field("ip", &self.ip)
			.finish_non_exhaustive()
	}
}

/// Issued authorization code and the redirect carrying it.
#[derive(Clone, Debug)]
pub struct LoginGrant {
	/// Opaque code value.
	pub code: Secret,
	/// `redirect_uri` with the `code` query parameter appended.
	pub redirect_url: String,
}

impl Authority {
	/// Authenticates `request` and persists a fresh authorization code.
	pub async fn login(&self, request: LoginRequest) -> Result<LoginGrant> {
		self.observed(FlowKind::Login, "login", async move {
			let client = self
				.store
				.fetch_client(&request.client_id)
				.await?
				.ok_or_else(|| Error::UnauthorizedClient { reason: "unknown client".into() })?;

			if !client.allows_redirect(&request.redirect_uri) {
				return Err(Error::InvalidRedirectUri);
			}

			let user = self.find_user(&request.identifier).await?;
			let username = match &user {
				Some(user) => user.username.clone(),
				None => request.identifier.clone(),
			};
			let user_identifier = identifier::user(&username);
			let decision = match &self.defense {
				Some(gate) => gate.check(&[request.ip.as_str(), user_identifier.as_str()]).await?,
				None => GateDecision::Allowed,
			};

			if let GateDecision::Blocked { identifier, retry_after } = decision {
				tracing::info!(
					identifier = %identifier,
					retry_after = %retry_after,
					"Login refused for blocked identifier."
				);

				return Err(Error::RateLimited { identifier, retry_after });
			}

			let verified = match &user {
				Some(user) => self.users.verify_password(&user.password_hash, &request.password)?,
				None => false,
			};
			let Some(user) = user.filter(|_| verified) else {
				if let Some(gate) = &self.defense {
					gate.record_failure(&request.ip, &username).await;
				}

				return Err(Error::InvalidCredentials);
			};

			if let Some(gate) = &self.defense {
				gate.record_success(&request.ip, &user.username).await;
			}

			self.issue_code(client.id, user, request).await
		})
		.await
	}

	async fn find_user(&self, identifier: &str) -> Result<Option<User>> {
		let user = if identifier.contains('@') {
			self.users.find_by_email(identifier).await?
		} else {
			self.users.find_by_username(identifier).await?
		};

		Ok(user)
	}

	async fn issue_code(
		&self,
		client_id: ClientId,
		user: User,
		request: LoginRequest,
	) -> Result<LoginGrant> {
		let code = Secret::generate();
		let scope = if request.scope.is_empty() { DEFAULT_SCOPE.to_owned() } else { request.scope };
		let redirect_url = {
			let mut serializer = url::form_urlencoded::Serializer::new(String::new());

			serializer.append_pair("code", code.expose());

			let separator = if request.redirect_uri.contains('?') { '&' } else { '?' };

			format!("{}{separator}{}", request.redirect_uri, serializer.finish())
		};

		self.store
			.save_authorization_code(AuthorizationCode {
				code: code.clone(),
				client_id,
				redirect_uri: request.redirect_uri,
				user_id: user.id,
				code_challenge: request.code_challenge,
				code_challenge_method: request.code_challenge_method,
				scope,
				expires_at: OffsetDateTime::now_utc() + self.code_ttl,
			})
			.await?;

		Ok(LoginGrant { code, redirect_url })
	}
}
