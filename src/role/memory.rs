//! In-process role resolver with direct assignments and group inheritance.

// self
use crate::{
	_prelude::*,
	role::{Group, Role, RoleFuture, RoleResolver},
};

#[derive(Debug, Default)]
struct Assignments {
	groups: HashMap<String, Group>,
	user_roles: HashMap<String, Vec<Role>>,
	user_groups: HashMap<String, BTreeSet<String>>,
}

/// Role resolver backed by in-memory assignment tables.
#[derive(Clone, Debug, Default)]
pub struct MemoryRoleResolver(Arc<RwLock<Assignments>>);
impl MemoryRoleResolver {
	/// Assigns a role directly to a subject.
	pub fn assign_role(&self, subject: impl Into<String>, role: Role) {
		let mut guard = self.0.write();
		let roles = guard.user_roles.entry(subject.into()).or_default();

		if !roles.iter().any(|existing| existing.id == role.id) {
			roles.push(role);
		}
	}

	/// Registers or replaces a group.
	pub fn add_group(&self, group: Group) {
		self.0.write().groups.insert(group.id.clone(), group);
	}

	/// Adds a subject to a group.
	pub fn assign_group(&self, subject: impl Into<String>, group_id: impl Into<String>) {
		self.0.write().user_groups.entry(subject.into()).or_default().insert(group_id.into());
	}

	fn resolve_now(&self, subject: &str) -> Vec<Role> {
		let guard = self.0.read();
		let mut seen = BTreeSet::new();
		let mut resolved = Vec::new();
		let direct = guard.user_roles.get(subject).into_iter().flatten();
		let inherited = guard
			.user_groups
			.get(subject)
			.into_iter()
			.flatten()
			.filter_map(|group_id| guard.groups.get(group_id))
			.flat_map(|group| group.roles.iter());

		for role in direct.chain(inherited) {
			if seen.insert(role.id.clone()) {
				resolved.push(role.clone());
			}
		}

		resolved
	}
}
impl RoleResolver for MemoryRoleResolver {
	fn resolve_roles<'a>(&'a self, subject: &'a str) -> RoleFuture<'a> {
		Box::pin(async move { Ok(self.resolve_now(subject)) })
	}
}
