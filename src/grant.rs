//! Grant-type selection for the token endpoint.
//!
//! The set of grants is closed: [`GrantRequest`] carries one variant per supported grant and
//! [`crate::flows::Authority::dispatch`] matches on it exhaustively.

pub mod form;

pub use form::*;

// self
use crate::_prelude::*;

/// OAuth 2.0 grant types served by the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization Code grant, PKCE-bound when the code carries a challenge.
	AuthorizationCode,
	/// Client Credentials grant for machine-to-machine tokens.
	ClientCredentials,
	/// Refresh Token grant.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::ClientCredentials => "client_credentials",
			GrantType::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for GrantType {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"authorization_code" => Ok(GrantType::AuthorizationCode),
			"client_credentials" => Ok(GrantType::ClientCredentials),
			"refresh_token" => Ok(GrantType::RefreshToken),
			other => Err(Error::UnsupportedGrantType { grant_type: other.to_owned() }),
		}
	}
}

/// Fully extracted token request, one variant per grant.
///
/// Fields are copied verbatim from the form; emptiness checks belong to the flows so that every
/// grant reports `invalid_request` the same way.
#[derive(Clone, Debug)]
pub enum GrantRequest {
	/// `grant_type=authorization_code`.
	AuthorizationCode {
		/// Code issued by the login path.
		code: String,
		/// Redirect URI the code was requested for.
		redirect_uri: String,
		/// PKCE verifier.
		code_verifier: String,
	},
	/// `grant_type=client_credentials`.
	ClientCredentials {
		/// HTTP Basic credentials, if the header was present and well-formed.
		credentials: Option<BasicCredentials>,
	},
	/// `grant_type=refresh_token`.
	RefreshToken {
		/// Previously issued refresh token.
		refresh_token: String,
	},
}
impl GrantRequest {
	/// Selects the grant named by `grant_type` and extracts its fields.
	pub fn from_form(form: &TokenForm) -> Result<Self> {
		let grant_type = form.field("grant_type");

		if grant_type.is_empty() {
			return Err(Error::invalid_request("grant_type is required"));
		}

		let request = match grant_type.parse::<GrantType>()? {
			GrantType::AuthorizationCode => GrantRequest::AuthorizationCode {
				code: form.field("code").to_owned(),
				redirect_uri: form.field("redirect_uri").to_owned(),
				code_verifier: form.field("code_verifier").to_owned(),
			},
			GrantType::ClientCredentials =>
				GrantRequest::ClientCredentials { credentials: form.basic_credentials().cloned() },
			GrantType::RefreshToken => GrantRequest::RefreshToken {
				refresh_token: form.field("refresh_token").to_owned(),
			},
		};

		Ok(request)
	}

	/// Grant type of this request.
	pub fn grant_type(&self) -> GrantType {
		match self {
			GrantRequest::AuthorizationCode { .. } => GrantType::AuthorizationCode,
			GrantRequest::ClientCredentials { .. } => GrantType::ClientCredentials,
			GrantRequest::RefreshToken { .. } => GrantType::RefreshToken,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn grant_type_strings_are_exact() {
		for grant in
			[GrantType::AuthorizationCode, GrantType::ClientCredentials, GrantType::RefreshToken]
		{
			assert_eq!(grant.as_str().parse::<GrantType>().expect("Round trip should parse."), grant);
		}

		assert!(matches!(
			"password".parse::<GrantType>(),
			Err(Error::UnsupportedGrantType { grant_type }) if grant_type == "password"
		));
		assert!("Authorization_Code".parse::<GrantType>().is_err());
	}

	#[test]
	fn from_form_selects_variant_and_extracts_fields() {
		let form = TokenForm::parse(
			"grant_type=authorization_code&code=C1&redirect_uri=https%3A%2F%2Fapp%2Fcb&code_verifier=V",
			None,
		);
		let GrantRequest::AuthorizationCode { code, redirect_uri, code_verifier } =
			GrantRequest::from_form(&form).expect("Form should select a grant.")
		else {
			panic!("Expected the authorization-code variant.");
		};

		assert_eq!(code, "C1");
		assert_eq!(redirect_uri, "https://app/cb");
		assert_eq!(code_verifier, "V");
	}

	#[test]
	fn missing_or_unknown_grant_type_is_rejected() {
		let missing = GrantRequest::from_form(&TokenForm::parse("code=C1", None))
			.expect_err("Missing grant_type must fail.");
		let unknown = GrantRequest::from_form(&TokenForm::parse("grant_type=password", None))
			.expect_err("Unknown grant_type must fail.");

		assert_eq!(missing.code(), "invalid_request");
		assert_eq!(unknown.code(), "unsupported_grant_type");
	}
}
