//! Scope-aware coalescing of interactive token acquisition.
//!
//! When several callers fail silent acquisition with an interaction-required error at
//! nearly the same time, prompting each of them separately would stack consent popups (or
//! race full-page redirects). [`InteractionCoalescer`] instead collects their scopes into
//! one pending map and issues a single interactive call for the union once a debounce
//! window closes.
//!
//! Rules:
//!
//! - A request that overlaps an already pending scope joins that scope's deferred; every
//!   other scope of the request is registered under the same deferred. Disjoint requests
//!   get a fresh deferred but still land in the same round if they arrive inside the window.
//! - Every request that registers at least one new scope restarts the window, so the
//!   round fires after a quiet period. [`CoalescerOptions::max_delay`] optionally caps how
//!   long a window may stay open.
//! - At most one interactive call is in flight. Scopes queued meanwhile wait for it to
//!   finish and then run as an immediate follow-up round.
//! - A round snapshots and clears the pending map before calling out, so requests that
//!   arrive while it runs never reuse a deferred that is about to settle.

mod deferred;
mod metrics;

pub use deferred::InteractionTicket;
pub use metrics::CoalescerMetrics;

// crates.io
use tokio::{
	runtime::Handle,
	task::JoinHandle,
	time::{self, Instant},
};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeRequest},
	config::DEFAULT_INTERACTION_DEBOUNCE_MS,
	error::ConfigError,
	fetch::{InteractionRequest, InteractiveOutcome, InteractiveTokenFetcher},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};
use deferred::{Deferred, RoundFailure};

/// Tuning knobs for an [`InteractionCoalescer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoalescerOptions {
	/// Quiet period that closes a coalescing window.
	pub debounce: Duration,
	/// Upper bound on how long a window may stay open; `None` leaves it unbounded.
	pub max_delay: Option<Duration>,
	/// Account hint forwarded with every interactive call.
	pub login_hint: Option<String>,
}
impl Default for CoalescerOptions {
	fn default() -> Self {
		Self {
			debounce: Duration::from_millis(DEFAULT_INTERACTION_DEBOUNCE_MS),
			max_delay: None,
			login_hint: None,
		}
	}
}

/// Batches interaction-required token requests into single interactive rounds.
///
/// Cloning is cheap and every clone drives the same pending map, timer, and in-flight flag.
/// Enqueueing spawns the debounce timer on the current tokio runtime.
#[derive(Clone)]
pub struct InteractionCoalescer {
	shared: Arc<Shared>,
}
impl InteractionCoalescer {
	/// Creates a coalescer that issues rounds through `fetcher`.
	pub fn new(fetcher: Arc<dyn InteractiveTokenFetcher>, options: CoalescerOptions) -> Self {
		Self {
			shared: Arc::new(Shared {
				fetcher,
				options,
				metrics: CoalescerMetrics::default(),
				state: Mutex::new(CoalescerState::default()),
			}),
		}
	}

	/// Acquires a token interactively, sharing the round with concurrent callers.
	///
	/// The caller is expected to have just failed silent acquisition for these scopes with an
	/// interaction-required error.
	pub async fn acquire_interactive<I, S>(&self, scopes: I) -> Result<AccessToken>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.enqueue(scopes)?.wait().await
	}

	/// Registers scopes for the next round and returns the ticket that observes it.
	pub fn enqueue<I, S>(&self, scopes: I) -> Result<InteractionTicket>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let request = ScopeRequest::new(scopes).map_err(ConfigError::from)?;

		self.enqueue_request(&request)
	}

	/// Registers an already normalized request for the next round.
	pub fn enqueue_request(&self, request: &ScopeRequest) -> Result<InteractionTicket> {
		if request.is_empty() {
			return Err(ConfigError::EmptyScopeRequest.into());
		}

		let runtime = Handle::try_current().map_err(|_| ConfigError::RuntimeUnavailable)?;
		let mut state = self.shared.state.lock();
		let existing = request.iter().find_map(|scope| state.pending.get(scope).cloned());
		let joined = existing.is_some();
		let deferred = match existing {
			Some(deferred) => deferred,
			None => {
				state.next_deferred_id += 1;

				Arc::new(Deferred::new(state.next_deferred_id))
			},
		};
		let mut registered_new_scope = false;

		for scope in request {
			if !state.pending.contains_key(scope) {
				state.pending.insert(scope.to_owned(), deferred.clone());
				state.order.push(scope.to_owned());

				registered_new_scope = true;
			}
		}

		self.shared.metrics.record_request(joined);
		obs::scopes_queued(request, deferred.id(), joined, state.order.len());

		if registered_new_scope {
			self.shared.restart_window(&mut state, &runtime);
		}

		Ok(deferred.ticket())
	}

	/// Scopes waiting for the next round, in registration order.
	pub fn pending_scopes(&self) -> Vec<String> {
		self.shared.state.lock().order.clone()
	}

	/// Number of distinct deferred outcomes waiting for the next round.
	pub fn pending_interactions(&self) -> usize {
		let state = self.shared.state.lock();
		let mut ids = state.pending.values().map(|deferred| deferred.id()).collect::<Vec<_>>();

		ids.sort_unstable();
		ids.dedup();

		ids.len()
	}

	/// Returns true while an interactive call is running.
	pub fn is_interaction_in_flight(&self) -> bool {
		self.shared.state.lock().in_flight
	}

	/// Counters for this coalescer.
	pub fn metrics(&self) -> &CoalescerMetrics {
		&self.shared.metrics
	}

	/// Options this coalescer was built with.
	pub fn options(&self) -> &CoalescerOptions {
		&self.shared.options
	}
}
impl Debug for InteractionCoalescer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.shared.state.lock();

		f.debug_struct("InteractionCoalescer")
			.field("options", &self.shared.options)
			.field("pending_scopes", &state.order)
			.field("in_flight", &state.in_flight)
			.finish()
	}
}

struct Shared {
	fetcher: Arc<dyn InteractiveTokenFetcher>,
	options: CoalescerOptions,
	metrics: CoalescerMetrics,
	state: Mutex<CoalescerState>,
}
impl Shared {
	fn restart_window(self: &Arc<Self>, state: &mut CoalescerState, runtime: &Handle) {
		let now = Instant::now();
		let opened_at = *state.window_opened_at.get_or_insert(now);
		let delay = match self.options.max_delay {
			Some(cap) =>
				self.options.debounce.min(cap.saturating_sub(now.saturating_duration_since(opened_at))),
			None => self.options.debounce,
		};

		if let Some(timer) = state.timer.take() {
			timer.abort();
		}

		state.timer_generation += 1;

		let generation = state.timer_generation;
		let shared = Arc::clone(self);

		state.timer = Some(runtime.spawn(async move {
			time::sleep(delay).await;
			shared.on_window_closed(generation).await;
		}));
	}

	async fn on_window_closed(self: Arc<Self>, generation: u64) {
		{
			let mut state = self.state.lock();

			// A newer window superseded this timer after it woke up.
			if state.timer_generation != generation {
				return;
			}

			state.timer = None;
		}

		self.drive_rounds().await;
	}

	async fn drive_rounds(self: &Arc<Self>) {
		while let Some(round) = self.begin_round() {
			let mut in_flight = InFlightReset { shared: self, settled: false };
			let span = FlowSpan::new(FlowKind::Interactive, "coalesced_round");

			obs::record_flow_outcome(FlowKind::Interactive, FlowOutcome::Attempt);
			obs::round_started(round.sequence, &round.request.scopes, round.deferreds.len());

			let outcome = match span.instrument(self.fetcher.fetch_interactive(&round.request)).await
			{
				Ok(InteractiveOutcome::Completed(response)) => Ok(response.access_token),
				Ok(InteractiveOutcome::Redirected) => Err(RoundFailure::Redirected),
				Err(e) => Err(RoundFailure::Interaction(e)),
			};
			let flow_outcome =
				if outcome.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

			if outcome.is_err() {
				self.metrics.record_round_failure();
			}

			for deferred in &round.deferreds {
				deferred.settle(outcome.clone());
			}

			in_flight.settled = true;

			obs::record_flow_outcome(FlowKind::Interactive, flow_outcome);
			obs::round_finished(round.sequence, flow_outcome);
		}
	}

	/// Snapshots and clears the pending map, unless a round is already running.
	fn begin_round(&self) -> Option<Round> {
		let mut state = self.state.lock();

		if state.in_flight || state.order.is_empty() {
			return None;
		}

		// The snapshot covers everything a sleeping window would have picked up.
		if let Some(timer) = state.timer.take() {
			timer.abort();
		}

		state.timer_generation += 1;
		state.window_opened_at = None;
		state.in_flight = true;

		let scopes = std::mem::take(&mut state.order);
		let pending = std::mem::take(&mut state.pending);
		let mut deferreds: Vec<Arc<Deferred>> = Vec::new();

		for scope in &scopes {
			if let Some(deferred) = pending.get(scope)
				&& !deferreds.iter().any(|known| known.id() == deferred.id())
			{
				deferreds.push(Arc::clone(deferred));
			}
		}

		let request = InteractionRequest::new(ScopeRequest::from_normalized(scopes))
			.with_login_hint(self.options.login_hint.clone());

		Some(Round { sequence: self.metrics.record_round(), request, deferreds })
	}
}

#[derive(Default)]
struct CoalescerState {
	pending: HashMap<String, Arc<Deferred>>,
	order: Vec<String>,
	in_flight: bool,
	timer: Option<JoinHandle<()>>,
	timer_generation: u64,
	window_opened_at: Option<Instant>,
	next_deferred_id: u64,
}

struct Round {
	sequence: u64,
	request: InteractionRequest,
	deferreds: Vec<Arc<Deferred>>,
}

/// Clears the in-flight flag when a round ends, including when its task panics or is cancelled.
///
/// A round that never settled leaves no loop behind to pick up scopes queued meanwhile, so a
/// fresh window is armed for them.
struct InFlightReset<'a> {
	shared: &'a Arc<Shared>,
	settled: bool,
}
impl Drop for InFlightReset<'_> {
	fn drop(&mut self) {
		let mut state = self.shared.state.lock();

		state.in_flight = false;

		if self.settled || state.order.is_empty() {
			return;
		}

		let rearmed = match Handle::try_current() {
			Ok(runtime) => {
				self.shared.restart_window(&mut state, &runtime);

				true
			},
			Err(_) => false,
		};

		obs::round_abandoned(state.order.len(), rearmed);
	}
}
