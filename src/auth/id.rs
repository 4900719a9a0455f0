//! Validated identifiers for clients and end users.
//!
//! Both kinds share one representation, [`Id`], tagged with an uninhabited marker so a
//! [`UserId`] can never be passed where a [`ClientId`] is expected.

// std
use std::{borrow::Borrow, marker::PhantomData, ops::Deref};
// crates.io
use serde::{Deserializer, Serializer, de::Error as _};
// self
use crate::_prelude::*;

const MAX_LEN: usize = 128;

/// Tags an [`Id`] with the entity it names.
pub trait IdKind
where
	Self: 'static + Copy + Eq + Ord + std::hash::Hash + Send + Sync,
{
	/// Entity name used in errors and `Debug` output.
	const LABEL: &'static str;
}

/// Marker of [`ClientId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClientKind {}
impl IdKind for ClientKind {
	const LABEL: &'static str = "Client";
}

/// Marker of [`UserId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UserKind {}
impl IdKind for UserKind {
	const LABEL: &'static str = "User";
}

/// Identifier of a registered relying-party client.
pub type ClientId = Id<ClientKind>;
/// Identifier of an authenticated end user.
pub type UserId = Id<UserKind>;

/// Non-empty identifier without whitespace, at most 128 bytes long.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id<K> {
	value: String,
	kind: PhantomData<K>,
}
impl<K> Id<K>
where
	K: IdKind,
{
	/// Validates `value` and wraps it.
	pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
		let value = value.into();
		let kind = K::LABEL;

		if value.is_empty() {
			Err(IdentifierError::Empty { kind })
		} else if value.chars().any(char::is_whitespace) {
			Err(IdentifierError::ContainsWhitespace { kind })
		} else if value.len() > MAX_LEN {
			Err(IdentifierError::TooLong { kind, max: MAX_LEN })
		} else {
			Ok(Self { value, kind: PhantomData })
		}
	}
}
impl<K> Deref for Id<K> {
	type Target = str;

	fn deref(&self) -> &str {
		&self.value
	}
}
impl<K> AsRef<str> for Id<K> {
	fn as_ref(&self) -> &str {
		&self.value
	}
}
impl<K> Borrow<str> for Id<K> {
	fn borrow(&self) -> &str {
		&self.value
	}
}
impl<K> Display for Id<K> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.value)
	}
}
impl<K> Debug for Id<K>
where
	K: IdKind,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}({})", K::LABEL, self.value)
	}
}
impl<K> Serialize for Id<K> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.value)
	}
}
impl<'de, K> Deserialize<'de> for Id<K>
where
	K: IdKind,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Self::new(String::deserialize(deserializer)?).map_err(D::Error::custom)
	}
}

/// Rejected identifier.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentifierError {
	/// Nothing was supplied.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Entity name.
		kind: &'static str,
	},
	/// Whitespace anywhere in the value.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Entity name.
		kind: &'static str,
	},
	/// Longer than the byte limit.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Entity name.
		kind: &'static str,
		/// Byte limit.
		max: usize,
	},
}
