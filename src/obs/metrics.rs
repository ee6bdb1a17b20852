// self
use crate::{
	auth::TokenKind,
	obs::{FlowKind, FlowOutcome},
	ratelimit::Direction,
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"xbl_core_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records one request against an identity endpoint.
pub fn record_identity_call(step: TokenKind) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("xbl_core_identity_call_total", "step" => step.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = step;
	}
}

/// Records a call refused by a client-side rate limiter.
pub fn record_rate_limited(direction: Direction) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("xbl_core_rate_limited_total", "direction" => direction.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = direction;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_flow_outcome(FlowKind::Refresh, FlowOutcome::Failure);
		record_identity_call(TokenKind::Xsts);
		record_rate_limited(Direction::Write);
	}
}
