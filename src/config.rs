//! Process configuration loaded from `AUTHORITY_*` environment variables.
//!
//! Nested fields use `__` as the separator, e.g. `AUTHORITY_JWT_SECRET` or
//! `AUTHORITY_RATE_LIMIT__MAX_ATTEMPTS`. Every field has a default except the signing secret,
//! which [`AuthorityConfig::validate`] requires.

// self
use crate::{
	_prelude::*,
	auth::Secret,
	defense::{
		DEFAULT_CAPACITY, DEFAULT_SWEEP_INTERVAL, DefenseGate, FailurePolicy, Limiter, LimiterConfig, LockConfig,
		LockingLimiter, MemoryKv, MemoryLimiter,
	},
	error::ConfigError,
	flows::Authority,
	role::RoleResolver,
	store::CredentialStore,
	token::TokenMinter,
	users::{MemoryUserProvider, UserProvider},
};

const ENV_PREFIX: &str = "AUTHORITY";

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
	/// Shared HMAC signing secret.
	pub jwt_secret: Secret,
	/// `aud` claim of minted tokens.
	pub audience: String,
	/// Access-token lifetime.
	pub access_token_ttl_secs: u64,
	/// Authorization-code lifetime.
	pub authorization_code_ttl_secs: u64,
	/// Embed resolved role names in minted tokens.
	pub include_roles_in_jwt: bool,
	/// Upper bound on one flow.
	pub request_timeout_ms: u64,
	/// Abuse-defense settings.
	pub rate_limit: RateLimitConfig,
	/// User directory settings.
	pub users: UsersConfig,
}
impl Default for AuthorityConfig {
	fn default() -> Self {
		Self {
			jwt_secret: Secret::new(""),
			audience: "oauth2-authority".into(),
			access_token_ttl_secs: 3600,
			authorization_code_ttl_secs: 600,
			include_roles_in_jwt: true,
			request_timeout_ms: 10_000,
			rate_limit: RateLimitConfig::default(),
			users: UsersConfig::default(),
		}
	}
}
impl AuthorityConfig {
	/// Loads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::load(None)
	}

	/// Loads the configuration from explicit `AUTHORITY_*` variables instead of the process
	/// environment.
	pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self::load(Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()))
	}

	fn load(vars: Option<::config::Map<String, String>>) -> Result<Self, ConfigError> {
		let environment = ::config::Environment::with_prefix(ENV_PREFIX)
			.prefix_separator("_")
			.separator("__")
			.try_parsing(true)
			.source(vars);
		let config = ::config::Config::builder().add_source(environment).build()?;

		Ok(config.try_deserialize()?)
	}

	/// Rejects settings the authority cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.jwt_secret.expose().is_empty() {
			return Err(ConfigError::MissingSecret);
		}

		ensure_positive("access_token_ttl_secs", self.access_token_ttl_secs)?;
		ensure_positive("authorization_code_ttl_secs", self.authorization_code_ttl_secs)?;
		ensure_positive("request_timeout_ms", self.request_timeout_ms)?;

		if self.rate_limit.enabled {
			self.rate_limit.validate()?;
		}

		self.users.validate()
	}

	/// Access-token lifetime.
	pub fn access_token_ttl(&self) -> Duration {
		Duration::seconds(i64::try_from(self.access_token_ttl_secs).unwrap_or(i64::MAX))
	}

	/// Authorization-code lifetime.
	pub fn authorization_code_ttl(&self) -> Duration {
		Duration::seconds(i64::try_from(self.authorization_code_ttl_secs).unwrap_or(i64::MAX))
	}

	/// Flow timeout handed to [`Authority::with_request_timeout`].
	pub fn request_timeout(&self) -> StdDuration {
		StdDuration::from_millis(self.request_timeout_ms)
	}

	/// Builds the token minter, attaching `roles` only when role claims are enabled.
	pub fn minter(&self, roles: Option<Arc<dyn RoleResolver>>) -> TokenMinter {
		let minter = TokenMinter::new(
			self.jwt_secret.expose(),
			self.audience.clone(),
			self.access_token_ttl(),
		);

		match roles {
			Some(resolver) if self.include_roles_in_jwt => minter.with_role_resolver(resolver),
			_ => minter,
		}
	}

	/// Builds the configured user directory.
	pub fn user_provider(&self) -> Result<Arc<dyn UserProvider>, ConfigError> {
		match self.users.backend {
			UserBackend::Memory => Ok(Arc::new(MemoryUserProvider::new())),
			#[cfg(feature = "reqwest")]
			UserBackend::Rest => {
				let url = self
					.users
					.rest_url
					.as_deref()
					.ok_or(ConfigError::MissingConnectionUrl { backend: "rest" })?;
				let provider =
					crate::users::RestUserProvider::new(url, self.users.rest_auth.clone())?;

				Ok(Arc::new(provider))
			},
			#[cfg(not(feature = "reqwest"))]
			UserBackend::Rest =>
				Err(ConfigError::FeatureDisabled { backend: "rest", feature: "reqwest" }),
		}
	}

	/// Builds the abuse-defense gate, or `None` when rate limiting is disabled.
	///
	/// The locking backend runs over [`MemoryKv`] and starts its index sweeper; call this from
	/// within a Tokio runtime.
	pub async fn defense_gate(&self) -> Result<Option<DefenseGate>> {
		let settings = &self.rate_limit;

		if !settings.enabled {
			return Ok(None);
		}

		let limits = settings.limiter_config();
		let limiter: Arc<dyn Limiter> = match settings.backend {
			LimiterBackend::Memory =>
				Arc::new(MemoryLimiter::with_capacity(limits, settings.max_entries)),
			LimiterBackend::Locking => {
				let limiter = Arc::new(
					LockingLimiter::new(MemoryKv::with_capacity(settings.max_entries), limits)
						.with_lock_config(settings.lock.lock_config()),
				);

				limiter.spawn_index_sweeper(settings.sweep_interval());

				limiter
			},
			#[cfg(feature = "redis")]
			LimiterBackend::Redis => {
				let url = settings
					.connection_url
					.as_deref()
					.ok_or(ConfigError::MissingConnectionUrl { backend: "redis" })?;

				Arc::new(crate::defense::RedisLimiter::connect(url, limits).await?)
			},
			#[cfg(not(feature = "redis"))]
			LimiterBackend::Redis =>
				return Err(ConfigError::FeatureDisabled { backend: "redis", feature: "redis" }
					.into()),
		};
		let gate = DefenseGate::new(limiter)
			.with_timeout(StdDuration::from_millis(settings.timeout_ms))
			.with_policy(settings.failure_policy);

		tracing::info!(
			backend = ?settings.backend,
			policy = ?settings.failure_policy,
			"Abuse defense enabled."
		);

		Ok(Some(gate))
	}
}

/// Abuse-defense backend selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterBackend {
	/// [`MemoryLimiter`].
	#[default]
	Memory,
	/// [`LockingLimiter`] over [`MemoryKv`].
	Locking,
	/// `RedisLimiter`; needs the `redis` feature and `connection_url`.
	Redis,
}

/// Abuse-defense settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
	/// Gate the login path at all.
	pub enabled: bool,
	/// Backend selector.
	pub backend: LimiterBackend,
	/// Connection URL for remote backends.
	pub connection_url: Option<String>,
	/// Failed attempts that trigger a block.
	pub max_attempts: u32,
	/// Block lifetime.
	pub block_duration_secs: u64,
	/// Failed-counter lifetime.
	pub counter_expiration_secs: u64,
	/// Association set lifetime.
	pub association_ttl_secs: u64,
	/// Blocked-index lifetime.
	pub blocked_index_ttl_secs: u64,
	/// Per-call timeout.
	pub timeout_ms: u64,
	/// Entry bound of each in-process table.
	pub max_entries: u64,
	/// Behavior on backend faults.
	pub failure_policy: FailurePolicy,
	/// Blocked-index sweep period of the locking backend.
	pub sweep_interval_secs: u64,
	/// Lock tuning of the locking backend.
	pub lock: LockSettings,
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			backend: LimiterBackend::Memory,
			connection_url: None,
			max_attempts: 5,
			block_duration_secs: 1800,
			counter_expiration_secs: 86_400,
			association_ttl_secs: 259_200,
			blocked_index_ttl_secs: 86_400,
			timeout_ms: 500,
			max_entries: DEFAULT_CAPACITY,
			failure_policy: FailurePolicy::Open,
			sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
			lock: LockSettings::default(),
		}
	}
}
impl RateLimitConfig {
	/// Thresholds handed to the limiter.
	pub fn limiter_config(&self) -> LimiterConfig {
		LimiterConfig {
			max_attempts: self.max_attempts,
			block_duration: StdDuration::from_secs(self.block_duration_secs),
			counter_expiration: StdDuration::from_secs(self.counter_expiration_secs),
			association_ttl: StdDuration::from_secs(self.association_ttl_secs),
			blocked_index_ttl: StdDuration::from_secs(self.blocked_index_ttl_secs),
		}
	}

	fn sweep_interval(&self) -> StdDuration {
		StdDuration::from_secs(self.sweep_interval_secs)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		ensure_positive("rate_limit.max_attempts", u64::from(self.max_attempts))?;
		ensure_positive("rate_limit.block_duration_secs", self.block_duration_secs)?;
		ensure_positive("rate_limit.counter_expiration_secs", self.counter_expiration_secs)?;
		ensure_positive("rate_limit.association_ttl_secs", self.association_ttl_secs)?;
		ensure_positive("rate_limit.blocked_index_ttl_secs", self.blocked_index_ttl_secs)?;
		ensure_positive("rate_limit.timeout_ms", self.timeout_ms)?;
		ensure_positive("rate_limit.max_entries", self.max_entries)?;

		match self.backend {
			LimiterBackend::Memory => Ok(()),
			LimiterBackend::Locking => {
				ensure_positive("rate_limit.sweep_interval_secs", self.sweep_interval_secs)?;
				ensure_positive("rate_limit.lock.ttl_secs", self.lock.ttl_secs)?;

				let wait = self.lock.lock_config().worst_case_wait();

				if wait >= StdDuration::from_millis(self.timeout_ms) {
					return Err(ConfigError::LockBudgetExceedsTimeout {
						wait_ms: wait.as_millis(),
						timeout_ms: self.timeout_ms,
					});
				}

				Ok(())
			},
			LimiterBackend::Redis => {
				if !cfg!(feature = "redis") {
					return Err(ConfigError::FeatureDisabled { backend: "redis", feature: "redis" });
				}
				if self.connection_url.as_deref().is_none_or(str::is_empty) {
					return Err(ConfigError::MissingConnectionUrl { backend: "redis" });
				}

				Ok(())
			},
		}
	}
}

/// Lock tuning of the locking backend.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockSettings {
	/// Lock key lifetime.
	pub ttl_secs: u64,
	/// Base retry delay.
	pub retry_delay_ms: u64,
	/// Retries after the first failed acquisition. With the jittered delay, the total wait must
	/// stay below `rate_limit.timeout_ms`.
	pub max_retries: u32,
}
impl Default for LockSettings {
	fn default() -> Self {
		Self { ttl_secs: 5, retry_delay_ms: 25, max_retries: 12 }
	}
}
impl LockSettings {
	/// Lock tuning handed to [`LockingLimiter`].
	pub fn lock_config(&self) -> LockConfig {
		LockConfig {
			ttl: StdDuration::from_secs(self.ttl_secs),
			retry_delay: StdDuration::from_millis(self.retry_delay_ms),
			max_retries: self.max_retries,
		}
	}
}

/// User directory selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserBackend {
	/// [`MemoryUserProvider`].
	#[default]
	Memory,
	/// `RestUserProvider`; needs the `reqwest` feature and `rest_url`.
	Rest,
}

/// User directory settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
	/// Backend selector.
	pub backend: UserBackend,
	/// Base URL of the REST directory.
	pub rest_url: Option<String>,
	/// `Authorization` header value sent to the REST directory.
	pub rest_auth: Option<String>,
}
impl UsersConfig {
	fn validate(&self) -> Result<(), ConfigError> {
		match self.backend {
			UserBackend::Memory => Ok(()),
			UserBackend::Rest => {
				if !cfg!(feature = "reqwest") {
					return Err(ConfigError::FeatureDisabled { backend: "rest", feature: "reqwest" });
				}

				let url = self
					.rest_url
					.as_deref()
					.filter(|url| !url.is_empty())
					.ok_or(ConfigError::MissingConnectionUrl { backend: "rest" })?;

				url::Url::parse(url)
					.map(drop)
					.map_err(|source| ConfigError::InvalidUrl { value: url.to_owned(), source })
			},
		}
	}
}

impl Authority {
	/// Validates `config` and assembles an authority around the provided collaborators.
	pub async fn from_config(
		config: &AuthorityConfig,
		store: Arc<dyn CredentialStore>,
		users: Arc<dyn UserProvider>,
		roles: Option<Arc<dyn RoleResolver>>,
	) -> Result<Self> {
		config.validate()?;

		let mut authority = Authority::new(store, config.minter(roles), users)
			.with_code_ttl(config.authorization_code_ttl())
			.with_request_timeout(config.request_timeout());

		authority.defense = config.defense_gate().await?;

		Ok(authority)
	}
}

fn ensure_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
	if value == 0 { Err(ConfigError::NonPositive { field }) } else { Ok(()) }
}
