//! Redacted secret wrapper plus opaque value generation.

// crates.io
use rand::{Rng, distr::Alphanumeric};
use subtle::ConstantTimeEq;
// self
use crate::_prelude::*;

const OPAQUE_LEN: usize = 43;

/// Redacted secret wrapper keeping client secrets, codes, and tokens out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Generates a fresh opaque value suitable for authorization codes and refresh tokens.
	pub fn generate() -> Self {
		Self(rand::rng().sample_iter(Alphanumeric).take(OPAQUE_LEN).map(char::from).collect())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Compares against a candidate in constant time.
	pub fn matches(&self, candidate: &str) -> bool {
		self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
	}
}
impl AsRef<str> for Secret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Secret").field(&"<redacted>").finish()
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = Secret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "Secret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn constant_time_match_is_exact() {
		let secret = Secret::new("s3cret");

		assert!(secret.matches("s3cret"));
		assert!(!secret.matches("s3cre"));
		assert!(!secret.matches("s3cret "));
		assert!(!secret.matches(""));
	}

	#[test]
	fn generated_values_are_opaque_and_distinct() {
		let a = Secret::generate();
		let b = Secret::generate();

		assert_eq!(a.expose().len(), OPAQUE_LEN);
		assert!(a.expose().chars().all(|c| c.is_ascii_alphanumeric()));
		assert_ne!(a, b);
	}
}
