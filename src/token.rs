//! HS256 access-token minting and validation.

pub mod claims;

pub use claims::*;

// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
// self
use crate::{_prelude::*, role::RoleResolver};

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Signed access token plus its lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
	/// Compact JWT.
	pub access_token: String,
	/// Lifetime in seconds, as advertised in `expires_in`.
	pub expires_in: i64,
	/// Expiry instant carried by the `exp` claim.
	pub expires_at: OffsetDateTime,
}
impl Debug for IssuedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IssuedToken")
			.field("access_token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builds and verifies bearer tokens with one process-wide shared secret.
///
/// When a [`RoleResolver`] is attached, minted tokens carry a `roles` claim. Resolution is
/// best-effort: resolver failures never block issuance.
#[derive(Clone)]
pub struct TokenMinter {
	encoding: EncodingKey,
	decoding: DecodingKey,
	audience: String,
	ttl: Duration,
	role_resolver: Option<Arc<dyn RoleResolver>>,
}
impl TokenMinter {
	/// Creates a minter for the provided secret, audience, and token lifetime.
	pub fn new(secret: impl AsRef<[u8]>, audience: impl Into<String>, ttl: Duration) -> Self {
		let secret = secret.as_ref();

		Self {
			encoding: EncodingKey::from_secret(secret),
			decoding: DecodingKey::from_secret(secret),
			audience: audience.into(),
			ttl,
			role_resolver: None,
		}
	}

	/// Enables role-claim enrichment.
	pub fn with_role_resolver(mut self, resolver: Arc<dyn RoleResolver>) -> Self {
		self.role_resolver = Some(resolver);

		self
	}

	/// Audience placed into the `aud` claim.
	pub fn audience(&self) -> &str {
		&self.audience
	}

	/// Configured token lifetime.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Mints a signed token for `subject` with `scope`.
	pub async fn mint(&self, subject: &str, scope: &str) -> Result<IssuedToken> {
		let issued_at = OffsetDateTime::now_utc();
		let expires_at = issued_at + self.ttl;
		let claims = AccessClaims {
			sub: subject.to_owned(),
			aud: self.audience.clone(),
			scope: scope.to_owned(),
			iat: issued_at.unix_timestamp(),
			exp: expires_at.unix_timestamp(),
			roles: self.resolve_role_names(subject).await,
		};
		let access_token =
			jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
				.map_err(Error::Signing)?;

		Ok(IssuedToken { access_token, expires_in: self.ttl.whole_seconds(), expires_at })
	}

	/// Verifies signature, expiry, and audience, returning the decoded claims.
	///
	/// Tokens whose header names a non-HMAC algorithm are rejected before any key is used.
	pub fn validate(&self, token: &str) -> Result<AccessClaims> {
		let header = jsonwebtoken::decode_header(token)
			.map_err(|e| Error::InvalidToken { reason: format!("malformed header ({e})") })?;

		if !HMAC_ALGORITHMS.contains(&header.alg) {
			return Err(Error::InvalidToken {
				reason: format!("unexpected signing algorithm {:?}", header.alg),
			});
		}

		let mut validation = Validation::new(header.alg);

		validation.leeway = 0;
		validation.set_audience(&[self.audience.as_str()]);
		validation.set_required_spec_claims(&["exp", "aud", "sub"]);

		let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &validation)
			.map_err(|e| Error::InvalidToken { reason: e.to_string() })?;

		Ok(data.claims)
	}

	/// Validates a bearer token and projects it into the userinfo view.
	pub fn user_info(&self, token: &str) -> Result<UserInfo> {
		self.validate(token).map(UserInfo::from)
	}

	async fn resolve_role_names(&self, subject: &str) -> Vec<String> {
		let Some(resolver) = self.role_resolver.as_ref() else {
			return Vec::new();
		};

		match resolver.resolve_roles(subject).await {
			Ok(roles) => roles.into_iter().map(|role| role.name).collect(),
			Err(e) => {
				tracing::debug!(subject, error = %e, "Role resolution failed; minting without roles.");

				Vec::new()
			},
		}
	}
}
impl Debug for TokenMinter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenMinter")
			.field("audience", &self.audience)
			.field("ttl", &self.ttl)
			.field("role_enrichment", &self.role_resolver.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use super::*;
	use crate::role::{MemoryRoleResolver, Role, RoleError, RoleFuture};

	struct FailingResolver;
	impl RoleResolver for FailingResolver {
		fn resolve_roles<'a>(&'a self, _: &'a str) -> RoleFuture<'a> {
			Box::pin(async { Err(RoleError::Backend { message: "directory offline".into() }) })
		}
	}

	fn minter() -> TokenMinter {
		TokenMinter::new("test-secret", "oauth2-authority", Duration::hours(1))
	}

	#[tokio::test]
	async fn minted_token_round_trips_through_validation() {
		let minter = minter();
		let issued = minter.mint("alice", "openid").await.expect("Minting should succeed.");
		let claims = minter.validate(&issued.access_token).expect("Token should validate.");
		let now = OffsetDateTime::now_utc().unix_timestamp();

		assert_eq!(claims.sub, "alice");
		assert_eq!(claims.aud, "oauth2-authority");
		assert_eq!(claims.scope, "openid");
		assert_eq!(issued.expires_in, 3600);
		assert!((claims.exp - (now + 3600)).abs() <= 5);
		assert!(claims.roles.is_empty());

		let header = jsonwebtoken::decode_header(&issued.access_token)
			.expect("Header should decode.");

		assert_eq!(header.alg, Algorithm::HS256);
		assert_eq!(header.typ.as_deref(), Some("JWT"));
	}

	#[tokio::test]
	async fn roles_are_embedded_when_resolver_is_attached() {
		let resolver = MemoryRoleResolver::default();

		resolver.assign_role("alice", Role::new("r1", "admin"));

		let minter = minter().with_role_resolver(Arc::new(resolver));
		let issued = minter.mint("alice", "openid").await.expect("Minting should succeed.");
		let claims = minter.validate(&issued.access_token).expect("Token should validate.");

		assert_eq!(claims.roles, vec!["admin".to_owned()]);
	}

	#[tokio::test]
	async fn resolver_failures_do_not_block_issuance() {
		let minter = minter().with_role_resolver(Arc::new(FailingResolver));
		let issued = minter.mint("alice", "openid").await.expect("Minting should still succeed.");
		let claims = minter.validate(&issued.access_token).expect("Token should validate.");

		assert!(claims.roles.is_empty());
	}

	#[tokio::test]
	async fn validation_rejects_wrong_secret_and_audience() {
		let issued = minter().mint("alice", "openid").await.expect("Minting should succeed.");
		let other_secret = TokenMinter::new("other", "oauth2-authority", Duration::hours(1));
		let other_audience = TokenMinter::new("test-secret", "someone-else", Duration::hours(1));

		assert!(matches!(
			other_secret.validate(&issued.access_token),
			Err(Error::InvalidToken { .. })
		));
		assert!(matches!(
			other_audience.validate(&issued.access_token),
			Err(Error::InvalidToken { .. })
		));
	}

	#[tokio::test]
	async fn expired_tokens_are_rejected() {
		let minter = TokenMinter::new("test-secret", "oauth2-authority", Duration::seconds(-10));
		let issued = minter.mint("alice", "openid").await.expect("Minting should succeed.");

		assert!(matches!(minter.validate(&issued.access_token), Err(Error::InvalidToken { .. })));
	}

	#[test]
	fn non_hmac_headers_are_rejected() {
		let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
		let now = OffsetDateTime::now_utc().unix_timestamp();
		let payload = URL_SAFE_NO_PAD.encode(format!(
			r#"{{"sub":"mallory","aud":"oauth2-authority","scope":"openid","iat":{now},"exp":{}}}"#,
			now + 3600
		));
		let message = format!("{header}.{payload}");
		let signature = jsonwebtoken::crypto::sign(
			message.as_bytes(),
			&EncodingKey::from_secret(b"test-secret"),
			Algorithm::HS256,
		)
		.expect("HMAC signing should succeed.");
		let forged = format!("{message}.{signature}");
		let err = minter().validate(&forged).expect_err("RS256 header must be rejected.");

		assert!(err.to_string().contains("unexpected signing algorithm"));
		assert_eq!(err.code(), "invalid_token");
	}

	#[tokio::test]
	async fn user_info_projects_subject_and_scope() {
		let minter = minter();
		let issued = minter.mint("svc", "default").await.expect("Minting should succeed.");
		let info = minter.user_info(&issued.access_token).expect("Token should validate.");

		assert_eq!(info, UserInfo { sub: "svc".into(), scope: "default".into() });
		assert!(minter.user_info("not-a-jwt").is_err());
	}
}
