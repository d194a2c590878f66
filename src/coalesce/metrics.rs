// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for coalesced interactive acquisition.
#[derive(Debug, Default)]
pub struct CoalescerMetrics {
	requests: AtomicU64,
	joined: AtomicU64,
	rounds: AtomicU64,
	round_failures: AtomicU64,
}
impl CoalescerMetrics {
	/// Returns the number of accepted interactive requests.
	pub fn requests(&self) -> u64 {
		self.requests.load(Ordering::Relaxed)
	}

	/// Returns how many requests joined an already pending deferred.
	pub fn joined(&self) -> u64 {
		self.joined.load(Ordering::Relaxed)
	}

	/// Returns the number of interactive calls issued.
	pub fn rounds(&self) -> u64 {
		self.rounds.load(Ordering::Relaxed)
	}

	/// Returns the number of rounds that did not produce a token.
	pub fn round_failures(&self) -> u64 {
		self.round_failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_request(&self, joined: bool) {
		self.requests.fetch_add(1, Ordering::Relaxed);

		if joined {
			self.joined.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Counts a new round and returns its 1-based sequence number.
	pub(crate) fn record_round(&self) -> u64 {
		self.rounds.fetch_add(1, Ordering::Relaxed) + 1
	}

	pub(crate) fn record_round_failure(&self) {
		self.round_failures.fetch_add(1, Ordering::Relaxed);
	}
}
