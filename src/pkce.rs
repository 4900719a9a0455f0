//! PKCE (RFC 7636) verification for the authorization-code exchange.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkceMethod {
	/// SHA-256 based PKCE.
	S256,
	/// Verifier equals challenge.
	#[serde(rename = "plain")]
	Plain,
}
impl PkceMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceMethod::S256 => "S256",
			PkceMethod::Plain => "plain",
		}
	}
}
impl Display for PkceMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for PkceMethod {
	type Err = PkceError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"S256" => Ok(PkceMethod::S256),
			"plain" => Ok(PkceMethod::Plain),
			other => Err(PkceError::UnsupportedMethod { method: other.to_owned() }),
		}
	}
}

/// Verification failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum PkceError {
	/// The stored method is neither `S256` nor `plain`.
	#[error("unsupported PKCE method `{method}`")]
	UnsupportedMethod {
		/// Raw method string.
		method: String,
	},
	/// The verifier does not reproduce the challenge.
	#[error("PKCE {method} verification failed")]
	Mismatch {
		/// Method that was checked.
		method: PkceMethod,
	},
}

/// Verifies `verifier` against a stored challenge.
///
/// An empty `challenge` or `method` means the code was issued without PKCE and verification
/// succeeds.
pub fn verify(challenge: &str, method: &str, verifier: &str) -> Result<(), PkceError> {
	if challenge.is_empty() || method.is_empty() {
		return Ok(());
	}

	let method = method.parse::<PkceMethod>()?;
	let matched = match method {
		PkceMethod::S256 => challenge_s256(verifier) == challenge,
		PkceMethod::Plain => verifier == challenge,
	};

	if matched { Ok(()) } else { Err(PkceError::Mismatch { method }) }
}

/// Computes the `S256` challenge for a verifier: unpadded base64url of its SHA-256 digest.
pub fn challenge_s256(verifier: &str) -> String {
	let mut hasher = Sha256::new();
	hasher.update(verifier.as_bytes());
	let digest = hasher.finalize();
	URL_SAFE_NO_PAD.encode(digest)
}
