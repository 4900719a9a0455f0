//! Token request decoding: form body plus HTTP Basic client credentials.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{_prelude::*, auth::Secret};

/// Client credentials carried by an `Authorization: Basic …` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicCredentials {
	/// Client identifier.
	pub client_id: String,
	/// Client secret.
	pub client_secret: Secret,
}
impl BasicCredentials {
	/// Decodes an `Authorization` header value; returns `None` unless it is well-formed Basic.
	pub fn from_header(value: &str) -> Option<Self> {
		let (scheme, encoded) = value.trim().split_once(' ')?;

		if !scheme.eq_ignore_ascii_case("basic") {
			return None;
		}

		let decoded = STANDARD.decode(encoded.trim()).ok()?;
		let decoded = String::from_utf8(decoded).ok()?;
		let (client_id, client_secret) = decoded.split_once(':')?;

		Some(Self { client_id: client_id.to_owned(), client_secret: Secret::new(client_secret) })
	}
}

/// Decoded `application/x-www-form-urlencoded` token request.
#[derive(Clone, Default)]
pub struct TokenForm {
	fields: HashMap<String, String>,
	basic: Option<BasicCredentials>,
}
impl TokenForm {
	/// Parses the body and optional `Authorization` header. The first occurrence of a field wins.
	pub fn parse(body: &str, authorization: Option<&str>) -> Self {
		let mut fields = HashMap::new();

		for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
			fields.entry(key.into_owned()).or_insert_with(|| value.into_owned());
		}

		Self { fields, basic: authorization.and_then(BasicCredentials::from_header) }
	}

	/// Returns a field value, or an empty string when absent.
	pub fn field(&self, name: &str) -> &str {
		self.fields.get(name).map(String::as_str).unwrap_or_default()
	}

	/// Basic credentials, if the header was present and well-formed.
	pub fn basic_credentials(&self) -> Option<&BasicCredentials> {
		self.basic.as_ref()
	}
}
impl Debug for TokenForm {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut names = self.fields.keys().collect::<Vec<_>>();

		names.sort();

		f.debug_struct("TokenForm")
			.field("fields", &names)
			.field("basic", &self.basic.as_ref().map(|basic| &basic.client_id))
			.finish()
	}
}
