//! Role resolver contract consumed by the token minter for claim enrichment.

pub mod memory;

pub use memory::MemoryRoleResolver;

// self
use crate::_prelude::*;

/// Boxed future returned by [`RoleResolver::resolve_roles`].
pub type RoleFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Role>, RoleError>> + 'a + Send>>;

/// Resolves the effective roles of a subject.
pub trait RoleResolver
where
	Self: Send + Sync,
{
	/// Returns direct roles plus roles inherited through group membership, deduplicated by id.
	fn resolve_roles<'a>(&'a self, subject: &'a str) -> RoleFuture<'a>;
}

/// Role definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
	/// Stable role identifier.
	pub id: String,
	/// Role name placed into token claims.
	pub name: String,
	/// Free-form description.
	#[serde(default)]
	pub description: String,
}
impl Role {
	/// Creates a role without description.
	pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
		Self { id: id.into(), name: name.into(), description: String::new() }
	}
}

/// Group bundling roles that members inherit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
	/// Stable group identifier.
	pub id: String,
	/// Display name.
	pub name: String,
	/// Roles granted to every member.
	#[serde(default)]
	pub roles: Vec<Role>,
}

/// Error type produced by [`RoleResolver`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RoleError {
	/// Backend-level failure.
	#[error("Role backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
