//! Observability helpers for grant flows, the login path, and the abuse-defense engine.
//!
//! # Feature Flags
//!
//! - Spans named `oauth2_authority.flow` with the `flow` and `stage` fields are always emitted
//!   through `tracing`.
//! - Enable `metrics` to increment `oauth2_authority_flow_total{flow,outcome}` and
//!   `oauth2_authority_defense_total{event}`.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization-code exchange.
	AuthorizationCode,
	/// Client Credentials grant.
	ClientCredentials,
	/// Refresh Token grant.
	Refresh,
	/// Interactive login issuing an authorization code.
	Login,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::Refresh => "refresh",
			FlowKind::Login => "login",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Abuse-defense events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DefenseEvent {
	/// A failed attempt was counted.
	FailedAttempt,
	/// An identifier crossed the threshold and was blocked.
	Blocked,
	/// An identifier was reset after a successful login.
	Reset,
	/// A backend call failed or timed out.
	BackendFault,
	/// A fault was treated as "not blocked".
	FailOpen,
	/// A fault refused the login.
	FailClosed,
}
impl DefenseEvent {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			DefenseEvent::FailedAttempt => "failed_attempt",
			DefenseEvent::Blocked => "blocked",
			DefenseEvent::Reset => "reset",
			DefenseEvent::BackendFault => "backend_fault",
			DefenseEvent::FailOpen => "fail_open",
			DefenseEvent::FailClosed => "fail_closed",
		}
	}
}
impl Display for DefenseEvent {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
