//! Counters published through the `metrics` facade.
//!
//! Every helper compiles to a no-op unless the `metrics` feature is enabled, so call sites in
//! the session layer stay unconditional.

// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counts one attempt, success, or failure of a token or API flow.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_gate_flow_total",
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

/// Counts a refresh token resolved without contacting the token endpoint.
pub fn record_token_reuse() {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_gate_token_reuse_total").increment(1);
	}
}

/// Counts a provider call replayed with a freshly refreshed access token.
pub fn record_replay(stage: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_gate_replay_total", "stage" => stage).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = stage;
	}
}
