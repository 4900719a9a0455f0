//! OAuth 2.0 authorization server core: grant dispatch, PKCE-bound code exchange, HS256 token
//! minting, and a login abuse-defense engine that runs over pluggable key-value backends.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod defense;
pub mod endpoint;
pub mod error;
pub mod flows;
pub mod grant;
pub mod login;
pub mod obs;
pub mod pkce;
pub mod role;
pub mod store;
pub mod token;
pub mod users;

mod _prelude {
	pub use std::{
		collections::{BTreeSet, HashMap},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "redis")] pub use redis;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {httpmock as _, oauth2 as _};
