//! Scripted fetchers shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use graph_auth_broker::{
	auth::{AccessToken, ClientId, ScopeRequest},
	config::{BrokerConfig, BrokerConfigBuilder, LoginType},
	error::AuthError,
	fetch::{
		AuthResponse, FetchFuture, InteractionRequest, InteractiveOutcome,
		InteractiveTokenFetcher, SilentTokenFetcher,
	},
};
use parking_lot::Mutex;

pub const ACCOUNT: &str = "adele@contoso.test";

pub fn config_builder(login_type: LoginType) -> BrokerConfigBuilder {
	let client_id = ClientId::new("11111111-2222-3333-4444-555555555555")
		.expect("Client identifier fixture should be valid.");

	BrokerConfig::builder(client_id).login_type(login_type)
}

pub fn config(login_type: LoginType) -> BrokerConfig {
	config_builder(login_type).build().expect("Broker config fixture should build.")
}

/// Interactive fetcher that records every round and answers from a script.
#[derive(Default)]
pub struct ScriptedInteractive {
	delay: Duration,
	redirect: bool,
	failures: Mutex<VecDeque<AuthError>>,
	panics: AtomicUsize,
	rounds: Mutex<Vec<Vec<String>>>,
	login_hints: Mutex<Vec<Option<String>>>,
	active: AtomicUsize,
	max_active: AtomicUsize,
	logins: AtomicUsize,
	logouts: AtomicUsize,
}
impl ScriptedInteractive {
	pub fn new() -> Self {
		Self::default()
	}

	/// Keeps each round open for `delay` before answering.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;

		self
	}

	/// Answers every call as a full-page redirect.
	pub fn redirecting(mut self) -> Self {
		self.redirect = true;

		self
	}

	/// Fails the next round with the provided error code.
	pub fn fail_next(&self, code: &str) {
		self.failures.lock().push_back(AuthError::new(code, "scripted failure"));
	}

	/// Panics inside the next round instead of answering.
	pub fn panic_next(&self) {
		self.panics.fetch_add(1, Ordering::SeqCst);
	}

	/// Scopes of every round, in call order.
	pub fn rounds(&self) -> Vec<Vec<String>> {
		self.rounds.lock().clone()
	}

	/// Login hint of every round, in call order.
	pub fn login_hints(&self) -> Vec<Option<String>> {
		self.login_hints.lock().clone()
	}

	pub fn round_count(&self) -> usize {
		self.rounds.lock().len()
	}

	/// Highest number of rounds that ran at the same time.
	pub fn max_concurrent(&self) -> usize {
		self.max_active.load(Ordering::SeqCst)
	}

	pub fn login_count(&self) -> usize {
		self.logins.load(Ordering::SeqCst)
	}

	pub fn logout_count(&self) -> usize {
		self.logouts.load(Ordering::SeqCst)
	}
}
impl InteractiveTokenFetcher for ScriptedInteractive {
	fn fetch_interactive<'a>(
		&'a self,
		request: &'a InteractionRequest,
	) -> FetchFuture<'a, InteractiveOutcome> {
		Box::pin(async move {
			let round = {
				let mut rounds = self.rounds.lock();

				rounds.push(request.scopes.as_slice().to_vec());

				rounds.len()
			};

			self.login_hints.lock().push(request.login_hint.clone());

			let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;

			self.max_active.fetch_max(active, Ordering::SeqCst);

			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}

			self.active.fetch_sub(1, Ordering::SeqCst);

			if self
				.panics
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
				.is_ok()
			{
				panic!("scripted panic in round {round}");
			}
			if let Some(error) = self.failures.lock().pop_front() {
				return Err(error);
			}
			if self.redirect {
				return Ok(InteractiveOutcome::Redirected);
			}

			Ok(InteractiveOutcome::Completed(
				AuthResponse::new(AccessToken::new(format!("round-{round}:{}", request.scopes)))
					.with_account(ACCOUNT),
			))
		})
	}

	fn login<'a>(&'a self, request: &'a InteractionRequest) -> FetchFuture<'a, InteractiveOutcome> {
		Box::pin(async move {
			self.logins.fetch_add(1, Ordering::SeqCst);

			if let Some(error) = self.failures.lock().pop_front() {
				return Err(error);
			}
			if self.redirect {
				return Ok(InteractiveOutcome::Redirected);
			}

			Ok(InteractiveOutcome::Completed(
				AuthResponse::new(AccessToken::new(format!("login:{}", request.scopes)))
					.with_account(ACCOUNT),
			))
		})
	}

	fn logout(&self) -> FetchFuture<'_, ()> {
		Box::pin(async move {
			self.logouts.fetch_add(1, Ordering::SeqCst);

			Ok(())
		})
	}
}

/// Silent fetcher that either succeeds or fails with one scripted code.
#[derive(Default)]
pub struct ScriptedSilent {
	failure: Mutex<Option<String>>,
	calls: AtomicUsize,
}
impl ScriptedSilent {
	pub fn succeeding() -> Self {
		Self::default()
	}

	pub fn failing(code: &str) -> Self {
		let fetcher = Self::default();

		fetcher.set_failure(Some(code));

		fetcher
	}

	pub fn set_failure(&self, code: Option<&str>) {
		*self.failure.lock() = code.map(str::to_owned);
	}

	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl SilentTokenFetcher for ScriptedSilent {
	fn fetch_silent<'a>(&'a self, scopes: &'a ScopeRequest) -> FetchFuture<'a, AccessToken> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			match self.failure.lock().clone() {
				Some(code) => Err(AuthError::new(code, "scripted silent failure")),
				None => Ok(AccessToken::new(format!("silent:{scopes}"))),
			}
		})
	}
}

pub fn shared<T>(value: T) -> Arc<T> {
	Arc::new(value)
}
