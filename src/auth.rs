//! Auth-domain identifiers, redacted secrets, and the credential records the store owns.

pub mod client;
pub mod code;
pub mod id;
pub mod refresh;
pub mod secret;

pub use client::*;
pub use code::*;
pub use id::*;
pub use refresh::*;
pub use secret::*;
