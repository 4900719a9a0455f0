//! Identifier encoding: raw IPs and `user:`-prefixed usernames.

/// Prefix distinguishing username identifiers from IPs.
pub const USER_PREFIX: &str = "user:";

/// Decoded identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentifierKind<'a> {
	/// Raw client IP.
	Ip(&'a str),
	/// Username, without the prefix.
	User(&'a str),
}

/// Identifier for a client IP.
pub fn ip(ip: &str) -> String {
	ip.to_owned()
}

/// Identifier for a username.
pub fn user(username: &str) -> String {
	format!("{USER_PREFIX}{username}")
}

/// Classifies an identifier; anything without the user prefix is an IP.
pub fn parse(identifier: &str) -> IdentifierKind<'_> {
	match identifier.strip_prefix(USER_PREFIX) {
		Some(username) => IdentifierKind::User(username),
		None => IdentifierKind::Ip(identifier),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn prefix_selects_kind() {
		assert_eq!(parse(&user("alice")), IdentifierKind::User("alice"));
		assert_eq!(parse(&ip("9.9.9.9")), IdentifierKind::Ip("9.9.9.9"));
		assert_eq!(parse("user:"), IdentifierKind::User(""));
		assert_eq!(parse("User:alice"), IdentifierKind::Ip("User:alice"));
	}
}
