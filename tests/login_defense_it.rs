mod common;

// std
use std::time::Duration;
// self
use common::*;
use oauth2_authority::{
	defense::{LimiterConfig, NOT_BLOCKED},
	error::Error,
};

const ATTACKER_IP: &str = "9.9.9.9";

fn limits() -> LimiterConfig {
	LimiterConfig {
		max_attempts: 5,
		block_duration: Duration::from_secs(30 * 60),
		..Default::default()
	}
}

#[tokio::test(start_paused = true)]
async fn sixth_attempt_is_refused_before_the_password_check() {
	let Fixture { authority, store, .. } = defended_fixture(limits());

	for attempt in 1..=5 {
		let err = authority
			.login(login_request(USERNAME, "wrong", ATTACKER_IP))
			.await
			.expect_err("Wrong passwords must fail.");

		assert!(matches!(err, Error::InvalidCredentials), "Attempt {attempt} should be denied.");
	}

	let err = authority
		.login(login_request(USERNAME, PASSWORD, ATTACKER_IP))
		.await
		.expect_err("Blocked identifiers must be refused even with the right password.");
	let Error::RateLimited { identifier, retry_after } = &err else {
		panic!("Expected a rate-limit refusal, got {err:?}.");
	};

	assert_eq!(identifier, ATTACKER_IP);
	assert_eq!(retry_after, "30m0s");
	assert_eq!(err.status(), 429);
	assert_eq!(store.pending_codes(), 0);

	let gate = authority.defense.as_ref().expect("Fixture should carry a gate.");
	let limiter = gate.limiter();

	assert_eq!(limiter.blocked_identifiers().await.expect("Listing should succeed."), [
		ATTACKER_IP.to_owned(),
		"user:alice".to_owned()
	]);
	assert_eq!(
		limiter.users_for_ip(ATTACKER_IP).await.expect("Lookup should succeed."),
		[USERNAME.to_owned()]
	);
}

#[tokio::test]
async fn blocked_user_is_refused_from_any_ip() {
	let Fixture { authority, .. } = defended_fixture(limits());

	for n in 0..5 {
		let _ = authority.login(login_request(USERNAME, "wrong", &format!("10.3.0.{n}"))).await;
	}

	let err = authority
		.login(login_request(USERNAME, PASSWORD, "10.3.0.99"))
		.await
		.expect_err("The user block applies to fresh IPs.");

	assert!(matches!(err, Error::RateLimited { ref identifier, .. } if identifier == "user:alice"));
}

#[tokio::test]
async fn successful_login_resets_counters() {
	let Fixture { authority, .. } = defended_fixture(limits());

	for _ in 0..4 {
		let _ = authority.login(login_request(USERNAME, "wrong", ATTACKER_IP)).await;
	}

	login(&authority, login_request(USERNAME, PASSWORD, ATTACKER_IP)).await;

	for _ in 0..4 {
		let _ = authority.login(login_request(USERNAME, "wrong", ATTACKER_IP)).await;
	}

	let limiter =
		authority.defense.as_ref().expect("Fixture should carry a gate.").limiter().clone();

	assert!(!limiter.is_blocked(ATTACKER_IP).await.expect("Lookup should succeed."));
	assert_eq!(
		limiter.remaining_block_time("user:alice").await.expect("Lookup should succeed."),
		NOT_BLOCKED
	);

	login(&authority, login_request(USERNAME, PASSWORD, ATTACKER_IP)).await;
}

#[tokio::test]
async fn unknown_client_is_rejected_without_counting() {
	let Fixture { authority, .. } = defended_fixture(limits());
	let request = oauth2_authority::login::LoginRequest {
		client_id: "ghost".into(),
		..login_request(USERNAME, "wrong", ATTACKER_IP)
	};
	let err = authority.login(request).await.expect_err("Unknown clients must fail.");

	assert_eq!(err.code(), "unauthorized_client");

	let limiter = authority.defense.as_ref().expect("Fixture should carry a gate.").limiter();

	assert!(limiter.users_for_ip(ATTACKER_IP).await.expect("Lookup should succeed.").is_empty());
}

#[tokio::test]
async fn email_login_shares_the_username_block() {
	let Fixture { authority, .. } = defended_fixture(limits());

	for n in 0..5 {
		let _ = authority.login(login_request(USERNAME, "wrong", &format!("10.4.0.{n}"))).await;
	}

	let err = authority
		.login(login_request(EMAIL, PASSWORD, "10.4.0.99"))
		.await
		.expect_err("Naming the account by e-mail must not bypass the user block.");

	assert!(matches!(err, Error::RateLimited { ref identifier, .. } if identifier == "user:alice"));
}

#[tokio::test]
async fn email_failures_count_against_the_username() {
	let Fixture { authority, .. } = defended_fixture(limits());

	for n in 0..5 {
		let _ = authority.login(login_request(EMAIL, "wrong", &format!("10.5.0.{n}"))).await;
	}

	let limiter = authority.defense.as_ref().expect("Fixture should carry a gate.").limiter();

	assert!(limiter.is_blocked("user:alice").await.expect("Lookup should succeed."));
	assert!(
		!limiter.is_blocked(&format!("user:{EMAIL}")).await.expect("Lookup should succeed.")
	);
	assert_eq!(
		limiter.users_for_ip("10.5.0.0").await.expect("Lookup should succeed."),
		[USERNAME.to_owned()]
	);
}
