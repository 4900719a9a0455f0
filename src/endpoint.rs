//! Transport-free token and userinfo endpoints.
//!
//! Both take the raw request pieces (body, `Authorization` header) and return the status,
//! content type, and body to write. Error bodies carry the short OAuth 2.0 code only.

// self
use crate::{_prelude::*, flows::Authority, grant::TokenForm};

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Response produced by an endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointResponse {
	/// HTTP status code.
	pub status: u16,
	/// `Content-Type` header value.
	pub content_type: &'static str,
	/// Response body.
	pub body: String,
}
impl EndpointResponse {
	/// Builds the plain-text error response for `err`, logging infrastructure failures.
	pub fn from_error(err: &Error) -> Self {
		if err.is_server_error() {
			tracing::error!(error = %err, "Endpoint failed with a server error.");
		}

		Self { status: err.status(), content_type: TEXT, body: err.code().to_owned() }
	}

	fn json<T>(value: &T) -> Self
	where
		T: Serialize,
	{
		match serde_json::to_string(value) {
			Ok(body) => Self { status: 200, content_type: JSON, body },
			Err(e) => {
				tracing::error!(error = %e, "Response serialization failed.");

				Self { status: 500, content_type: TEXT, body: "server_error".into() }
			},
		}
	}
}

/// `POST /token`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenEndpoint;
impl TokenEndpoint {
	/// Decodes the form body and dispatches it to the matching grant flow.
	pub async fn handle(
		authority: &Authority,
		body: &str,
		authorization: Option<&str>,
	) -> EndpointResponse {
		let form = TokenForm::parse(body, authorization);

		match authority.handle_form(&form).await {
			Ok(response) => EndpointResponse::json(&response),
			Err(e) => EndpointResponse::from_error(&e),
		}
	}
}

/// `GET /userinfo`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserInfoEndpoint;
impl UserInfoEndpoint {
	/// Validates the bearer token and returns `{sub, scope}`.
	pub fn handle(authority: &Authority, authorization: Option<&str>) -> EndpointResponse {
		let Some(token) = authorization.and_then(|value| value.strip_prefix("Bearer ")) else {
			return EndpointResponse::from_error(&Error::InvalidToken {
				reason: "missing bearer token".into(),
			});
		};

		match authority.minter.user_info(token.trim()) {
			Ok(info) => EndpointResponse::json(&info),
			Err(e) => EndpointResponse::from_error(&e),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn error_bodies_carry_only_the_code() {
		let response = EndpointResponse::from_error(&Error::invalid_grant("pkce: mismatch"));

		assert_eq!(response.status, 400);
		assert_eq!(response.content_type, TEXT);
		assert_eq!(response.body, "invalid_grant");

		let response = EndpointResponse::from_error(&Error::Storage(
			crate::store::StoreError::Backend { message: "db password is hunter2".into() },
		));

		assert_eq!(response.status, 500);
		assert_eq!(response.body, "server_error");
	}
}
