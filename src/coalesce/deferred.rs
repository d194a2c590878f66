//! Shared deferred outcomes handed to every caller of a coalesced round.

// crates.io
use tokio::sync::watch;
// self
use crate::{_prelude::*, auth::AccessToken};

/// Why a round did not produce a token.
#[derive(Clone, Debug)]
pub(crate) enum RoundFailure {
	/// The interactive call failed.
	Interaction(AuthError),
	/// The interactive call continues through a redirect.
	Redirected,
}

pub(crate) type RoundOutcome = Result<AccessToken, RoundFailure>;

/// Write side of a shared outcome; stored under every scope key it covers.
pub(crate) struct Deferred {
	id: u64,
	sender: watch::Sender<Option<RoundOutcome>>,
}
impl Deferred {
	pub(crate) fn new(id: u64) -> Self {
		let (sender, _) = watch::channel(None);

		Self { id, sender }
	}

	pub(crate) fn id(&self) -> u64 {
		self.id
	}

	pub(crate) fn ticket(&self) -> InteractionTicket {
		InteractionTicket { id: self.id, receiver: self.sender.subscribe() }
	}

	/// Publishes the outcome; later calls are ignored so each deferred settles once.
	pub(crate) fn settle(&self, outcome: RoundOutcome) -> bool {
		self.sender.send_if_modified(|slot| {
			if slot.is_some() {
				return false;
			}

			*slot = Some(outcome);

			true
		})
	}
}
impl Debug for Deferred {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Deferred")
			.field("id", &self.id)
			.field("settled", &self.sender.borrow().is_some())
			.finish()
	}
}

/// Read side of a shared outcome returned to each caller.
///
/// Tickets issued for overlapping requests inside one coalescing window observe the same
/// outcome; [`shares_interaction_with`](Self::shares_interaction_with) tells whether two
/// tickets were issued for the same underlying deferred.
#[derive(Clone)]
pub struct InteractionTicket {
	id: u64,
	receiver: watch::Receiver<Option<RoundOutcome>>,
}
impl InteractionTicket {
	/// Identifier of the deferred this ticket observes.
	pub fn interaction_id(&self) -> u64 {
		self.id
	}

	/// Returns true when both tickets observe the same deferred outcome.
	pub fn shares_interaction_with(&self, other: &InteractionTicket) -> bool {
		self.id == other.id
	}

	/// Returns true once the round behind this ticket has settled.
	pub fn is_settled(&self) -> bool {
		self.receiver.borrow().is_some()
	}

	/// Waits for the round behind this ticket to settle.
	pub async fn wait(mut self) -> Result<AccessToken> {
		let outcome = match self.receiver.wait_for(Option::is_some).await {
			Ok(slot) => slot.clone(),
			Err(_) => None,
		};

		match outcome {
			Some(Ok(token)) => Ok(token),
			Some(Err(RoundFailure::Interaction(e))) => Err(Error::InteractionFailed(e)),
			Some(Err(RoundFailure::Redirected)) => Err(Error::InteractionRedirected),
			None => Err(Error::InteractionAbandoned),
		}
	}
}
impl Debug for InteractionTicket {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("InteractionTicket")
			.field("interaction_id", &self.id)
			.field("settled", &self.is_settled())
			.finish()
	}
}
