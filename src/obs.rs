//! Optional observability helpers for login, refresh, and dispatch flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `xbl_core.flow` with the `flow` and
//!   `stage` fields; identity-endpoint calls also carry the chain `step`.
//! - Enable `metrics` to increment `xbl_core_flow_total` (labeled by `flow` + `outcome`),
//!   `xbl_core_identity_call_total` (labeled by `step`), and `xbl_core_rate_limited_total`
//!   (labeled by `direction`).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization-code exchange followed by the first full chain build.
	Login,
	/// Refresh of the stale part of the token chain.
	Refresh,
	/// Signed request dispatch.
	Dispatch,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Login => "login",
			FlowKind::Refresh => "refresh",
			FlowKind::Dispatch => "dispatch",
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
