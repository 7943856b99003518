//! Spans and events for the session layer.

// self
use crate::{_prelude::*, obs::FlowKind};

/// Future returned by [`FlowSpan::instrument`]; the bare future without the `tracing` feature.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`]; the bare future without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span around one code exchange, refresh, or provider call.
///
/// The `stage` field names the public operation that started the flow, e.g. `user_info`.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens an `oauth2_gate.flow` span.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("oauth2_gate.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Runs `fut` inside the span.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a warning that the provider rejected a credential.
///
/// Only the credential fingerprint is logged.
pub fn warn_rejected(kind: FlowKind, fingerprint: &str, reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(flow = kind.as_str(), token = fingerprint, %reason, "credential rejected");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, fingerprint, reason);
	}
}

/// Notes that the provider refused an access token and the call is replayed after a refresh.
pub fn debug_replay(stage: &'static str, fingerprint: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(stage, token = fingerprint, "access token refused; replaying after refresh");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, fingerprint);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn rejection_warning_is_callable_without_a_subscriber() {
		warn_rejected(FlowKind::Refresh, "abc123", &"invalid_grant");
		debug_replay("guilds", "abc123");
	}

	#[tokio::test]
	async fn instrument_passes_the_output_through() {
		let span = FlowSpan::new(FlowKind::ApiCall, "instrument_passes_the_output_through");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
