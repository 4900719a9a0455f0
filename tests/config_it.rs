mod common;

// std
use std::sync::Arc;
// self
use common::*;
use oauth2_authority::{
	config::AuthorityConfig,
	flows::Authority,
	role::{MemoryRoleResolver, Role, RoleResolver},
};

async fn authority_from(vars: &[(&str, &str)], roles: Option<Arc<dyn RoleResolver>>) -> Authority {
	let Fixture { store, users, .. } = fixture();
	let config = AuthorityConfig::from_vars(vars.iter().copied()).expect("Variables should load.");

	Authority::from_config(&config, Arc::new(store), Arc::new(users), roles)
		.await
		.expect("Configuration should assemble an authority.")
}

#[tokio::test]
async fn locking_backend_gates_logins() {
	let authority = authority_from(
		&[
			("AUTHORITY_JWT_SECRET", JWT_SECRET),
			("AUTHORITY_RATE_LIMIT__BACKEND", "locking"),
			("AUTHORITY_RATE_LIMIT__MAX_ATTEMPTS", "2"),
		],
		None,
	)
	.await;

	for _ in 0..2 {
		let _ = authority.login(login_request(USERNAME, "wrong", "8.8.8.8")).await;
	}

	let err = authority
		.login(login_request(USERNAME, PASSWORD, "8.8.8.8"))
		.await
		.expect_err("The locking backend should block after two failures.");

	assert_eq!(err.code(), "rate_limited");
	assert!(err.to_string().contains("~30 minutes"));
}

#[tokio::test]
async fn role_claims_follow_the_toggle() {
	let resolver = MemoryRoleResolver::default();

	resolver.assign_role(USER_ID, Role::new("r1", "admin"));

	let roles: Arc<dyn RoleResolver> = Arc::new(resolver);

	for (toggle, expected) in [("true", vec!["admin".to_owned()]), ("false", Vec::new())] {
		let authority = authority_from(
			&[
				("AUTHORITY_JWT_SECRET", JWT_SECRET),
				("AUTHORITY_INCLUDE_ROLES_IN_JWT", toggle),
				("AUTHORITY_RATE_LIMIT__ENABLED", "false"),
			],
			Some(roles.clone()),
		)
		.await;

		assert!(authority.defense.is_none());

		let grant = login(&authority, login_request(USERNAME, PASSWORD, "8.8.4.4")).await;
		let issued = authority
			.exchange_authorization_code(grant.code.expose(), REDIRECT_URI, PLAIN_VERIFIER)
			.await
			.expect("Exchange should succeed.");
		let claims = authority.minter.validate(&issued.access_token).expect("Token should validate.");

		assert_eq!(claims.roles, expected);
	}
}

#[tokio::test]
async fn missing_secret_refuses_to_start() {
	let Fixture { store, users, .. } = fixture();
	let config = AuthorityConfig::default();
	let err = Authority::from_config(&config, Arc::new(store), Arc::new(users), None)
		.await
		.expect_err("An empty signing secret must be rejected.");

	assert!(err.is_server_error());
}
