// self
use crate::obs::{DefenseEvent, FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_authority_flow_total",
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

/// Records an abuse-defense event via the global metrics recorder (when enabled).
pub fn record_defense_event(event: DefenseEvent) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_authority_defense_total", "event" => event.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = event;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_are_callable_without_a_global_recorder() {
		record_flow_outcome(FlowKind::Login, FlowOutcome::Failure);
		record_defense_event(DefenseEvent::FailOpen);
	}
}
