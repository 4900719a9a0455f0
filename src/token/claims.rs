//! Access-token claim set and the userinfo projection.

// self
use crate::_prelude::*;

/// JWT payload carried by every access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
	/// User id or client id.
	pub sub: String,
	/// Fixed audience string.
	pub aud: String,
	/// Granted scope.
	pub scope: String,
	/// Issued-at, seconds since the Unix epoch.
	pub iat: i64,
	/// Expiry, seconds since the Unix epoch.
	pub exp: i64,
	/// Role names; omitted when empty.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub roles: Vec<String>,
}

/// Resource-server view of a validated token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
	/// Token subject.
	pub sub: String,
	/// Granted scope.
	pub scope: String,
}
impl From<AccessClaims> for UserInfo {
	fn from(claims: AccessClaims) -> Self {
		Self { sub: claims.sub, scope: claims.scope }
	}
}
