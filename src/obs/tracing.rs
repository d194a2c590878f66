// self
use crate::{
	_prelude::*,
	auth::ScopeRequest,
	obs::{FlowKind, FlowOutcome},
	provider::ProviderState,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("graph_auth_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
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

/// Records that a request registered scopes with the coalescer.
pub(crate) fn scopes_queued(request: &ScopeRequest, interaction: u64, joined: bool, pending: usize) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(
			scopes = %request,
			interaction,
			joined,
			pending,
			"scopes queued for interactive acquisition"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (request, interaction, joined, pending);
	}
}

/// Records the start of a coalesced round.
pub(crate) fn round_started(round: u64, scopes: &ScopeRequest, interactions: usize) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(round, scopes = %scopes, interactions, "interactive round started");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (round, scopes, interactions);
	}
}

/// Records the end of a coalesced round.
pub(crate) fn round_finished(round: u64, outcome: FlowOutcome) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(round, outcome = outcome.as_str(), "interactive round finished");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (round, outcome);
	}
}

/// Records a round that ended without settling while scopes were still queued.
pub(crate) fn round_abandoned(pending: usize, rearmed: bool) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(pending, rearmed, "interactive round abandoned before settling");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (pending, rearmed);
	}
}

/// Records a provider sign-in state transition.
pub(crate) fn state_changed(from: ProviderState, to: ProviderState) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(from = from.as_str(), to = to.as_str(), "provider state changed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (from, to);
	}
}

/// Records a session store failure that did not block the flow.
pub(crate) fn session_store_failed(stage: &'static str, error: &crate::store::StoreError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(stage, error = %error, "session store operation failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, error);
	}
}
