//! Authority-level error types shared across flows, the login path, and collaborators.

// self
use crate::_prelude::*;

/// Authority-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical authority error exposed by public APIs.
///
/// The OAuth variants map one-to-one onto the short machine-readable codes returned by the
/// token endpoint; everything else collapses into `server_error` on the wire.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Abuse-defense backend failure.
	#[error(transparent)]
	Limiter(#[from] crate::defense::LimiterError),
	/// User provider failure.
	#[error(transparent)]
	Users(#[from] crate::users::UserProviderError),
	/// Token signing failure; an unsigned token is never returned.
	#[error("Token signing failed.")]
	Signing(#[source] jsonwebtoken::errors::Error),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Request is malformed or misses a required field.
	#[error("Request is invalid: {reason}.")]
	InvalidRequest {
		/// Human-readable reason, never sent to the client.
		reason: String,
	},
	/// Client is unknown or its secret does not match.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Human-readable reason, never sent to the client.
		reason: String,
	},
	/// Client exists but fails a policy check.
	#[error("Client is not authorized: {reason}.")]
	UnauthorizedClient {
		/// Human-readable reason, never sent to the client.
		reason: String,
	},
	/// Redirect URI is not registered or differs from the one bound to the code.
	#[error("Redirect URI is not authorized.")]
	InvalidRedirectUri,
	/// Code or refresh token is absent, expired, already used, or fails PKCE.
	#[error("Grant is invalid: {reason}.")]
	InvalidGrant {
		/// Human-readable reason, never sent to the client.
		reason: String,
	},
	/// `grant_type` names no supported flow.
	#[error("Grant type `{grant_type}` is not supported.")]
	UnsupportedGrantType {
		/// Raw grant type received.
		grant_type: String,
	},
	/// Abuse-defense block is active for the identifier.
	#[error("Identifier `{identifier}` is blocked; retry in {retry_after}.")]
	RateLimited {
		/// Blocked identifier (raw IP or `user:`-prefixed username).
		identifier: String,
		/// Human-readable remaining block time.
		retry_after: String,
	},
	/// Login credentials were rejected.
	#[error("Invalid credentials.")]
	InvalidCredentials,
	/// The flow outlived [`Authority::request_timeout`](crate::flows::Authority::request_timeout).
	#[error("Request timed out during `{stage}`.")]
	Timeout {
		/// Flow stage that was running.
		stage: &'static str,
	},
	/// Bearer token failed validation.
	#[error("Access token is invalid: {reason}.")]
	InvalidToken {
		/// Human-readable reason, never sent to the client.
		reason: String,
	},
}
impl Error {
	/// Returns the OAuth 2.0 error code written to the response body.
	pub fn code(&self) -> &'static str {
		match self {
			Error::InvalidRequest { .. } => "invalid_request",
			Error::InvalidClient { .. } => "invalid_client",
			Error::UnauthorizedClient { .. } => "unauthorized_client",
			Error::InvalidRedirectUri => "invalid_redirect_uri",
			Error::InvalidGrant { .. } => "invalid_grant",
			Error::UnsupportedGrantType { .. } => "unsupported_grant_type",
			Error::RateLimited { .. } => "rate_limited",
			Error::InvalidCredentials => "access_denied",
			Error::InvalidToken { .. } => "invalid_token",
			Error::Storage(_)
			| Error::Limiter(_)
			| Error::Users(_)
			| Error::Signing(_)
			| Error::Config(_)
			| Error::Timeout { .. } => "server_error",
		}
	}

	/// Returns the HTTP status code associated with the error.
	pub fn status(&self) -> u16 {
		match self {
			Error::InvalidRequest { .. }
			| Error::UnauthorizedClient { .. }
			| Error::InvalidRedirectUri
			| Error::InvalidGrant { .. }
			| Error::UnsupportedGrantType { .. } => 400,
			Error::InvalidClient { .. } | Error::InvalidCredentials | Error::InvalidToken { .. } =>
				401,
			Error::RateLimited { .. } => 429,
			Error::Storage(_)
			| Error::Limiter(_)
			| Error::Users(_)
			| Error::Signing(_)
			| Error::Config(_)
			| Error::Timeout { .. } => 500,
		}
	}

	/// Returns `true` for infrastructure failures that surface as `server_error`.
	pub fn is_server_error(&self) -> bool {
		self.status() >= 500
	}

	pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
		Self::InvalidRequest { reason: reason.into() }
	}

	pub(crate) fn invalid_grant(reason: impl Into<String>) -> Self {
		Self::InvalidGrant { reason: reason.into() }
	}

	pub(crate) fn invalid_client(reason: impl Into<String>) -> Self {
		Self::InvalidClient { reason: reason.into() }
	}
}

/// Configuration and validation failures raised while assembling the authority.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Configuration sources could not be read or deserialized.
	#[error("Configuration could not be loaded.")]
	Load(#[from] config::ConfigError),
	/// Signing secret is empty.
	#[error("JWT signing secret must not be empty.")]
	MissingSecret,
	/// A numeric field must be strictly positive.
	#[error("`{field}` must be greater than zero.")]
	NonPositive {
		/// Offending field name.
		field: &'static str,
	},
	/// The configured backend needs a connection URL.
	#[error("Backend `{backend}` requires a connection URL.")]
	MissingConnectionUrl {
		/// Backend label.
		backend: &'static str,
	},
	/// The configured backend was not compiled in.
	#[error("Backend `{backend}` requires the `{feature}` crate feature.")]
	FeatureDisabled {
		/// Backend label.
		backend: &'static str,
		/// Cargo feature that enables it.
		feature: &'static str,
	},
	/// Lock acquisition can back off for longer than a defense call may take.
	#[error("Lock retries can wait {wait_ms}ms, exceeding the {timeout_ms}ms defense timeout.")]
	LockBudgetExceedsTimeout {
		/// Worst-case backoff in milliseconds.
		wait_ms: u128,
		/// Configured per-call timeout.
		timeout_ms: u64,
	},
	/// The configured URL cannot be parsed.
	#[error("URL `{value}` is invalid.")]
	InvalidUrl {
		/// Raw URL value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
