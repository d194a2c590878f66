//! Token provider facade composing silent acquisition, classification, and coalescing.
//!
//! [`TokenProvider`] is what hosts call for tokens. It tries the silent fetcher first,
//! classifies failures, and routes interaction-required ones through the shared
//! [`InteractionCoalescer`] so simultaneous consent demands surface as one prompt. It also
//! tracks the sign-in state and the session scope ledger used by redirect flows.

// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeRequest},
	classify::{DefaultInteractionClassifier, InteractionClassifier},
	coalesce::InteractionCoalescer,
	config::{BrokerConfig, LoginType},
	error::ConfigError,
	fetch::{
		FetchFuture, InteractionRequest, InteractiveOutcome, InteractiveTokenFetcher, Prompt,
		RedirectResponse, ResponseKind, SilentTokenFetcher,
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{MemoryStore, ScopeLedger, SessionStore},
};

/// Sign-in state reported by a [`TokenProvider`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
	/// The provider has not determined whether a user is signed in.
	#[default]
	Loading,
	/// No user is signed in.
	SignedOut,
	/// A user is signed in.
	SignedIn,
}
impl ProviderState {
	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProviderState::Loading => "loading",
			ProviderState::SignedOut => "signed_out",
			ProviderState::SignedIn => "signed_in",
		}
	}
}
impl Display for ProviderState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Acquires access tokens for one application registration.
///
/// The provider owns the configuration, both fetchers, the classifier, the session scope
/// ledger, and a single coalescer. Without [`with_session_store`](Self::with_session_store)
/// the ledger lives in process memory.
pub struct TokenProvider {
	config: BrokerConfig,
	silent: Arc<dyn SilentTokenFetcher>,
	interactive: Arc<dyn InteractiveTokenFetcher>,
	classifier: Arc<dyn InteractionClassifier>,
	ledger: ScopeLedger,
	coalescer: InteractionCoalescer,
	scopes: RwLock<ScopeRequest>,
	state: watch::Sender<ProviderState>,
	login_guard: AsyncMutex<()>,
}
impl TokenProvider {
	/// Creates a provider in the [`ProviderState::Loading`] state.
	pub fn new(
		config: BrokerConfig,
		silent: Arc<dyn SilentTokenFetcher>,
		interactive: Arc<dyn InteractiveTokenFetcher>,
	) -> Self {
		let ledger = ScopeLedger::new(Arc::new(MemoryStore::default()));
		let coalescer = build_coalescer(&config, &interactive, &ledger);
		let (state, _) = watch::channel(ProviderState::Loading);

		Self {
			scopes: RwLock::new(config.scopes.clone()),
			config,
			silent,
			interactive,
			classifier: Arc::new(DefaultInteractionClassifier::default()),
			ledger,
			coalescer,
			state,
			login_guard: AsyncMutex::new(()),
		}
	}

	/// Replaces the classifier that decides which silent failures warrant interaction.
	pub fn with_classifier(mut self, classifier: Arc<dyn InteractionClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Keeps the scope ledger in the provided session store.
	pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
		self.ledger = ScopeLedger::new(store);
		self.coalescer = build_coalescer(&self.config, &self.interactive, &self.ledger);

		self
	}

	/// Configuration this provider was built from.
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}

	/// Coalescer shared by every interactive acquisition of this provider.
	pub fn coalescer(&self) -> &InteractionCoalescer {
		&self.coalescer
	}

	/// Session scope ledger.
	pub fn ledger(&self) -> &ScopeLedger {
		&self.ledger
	}

	/// Scopes used when callers do not pass their own.
	pub fn scopes(&self) -> ScopeRequest {
		self.scopes.read().clone()
	}

	/// Replaces the default scopes.
	pub fn update_scopes<I, S>(&self, scopes: I) -> Result<()>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let scopes = ScopeRequest::new(scopes).map_err(ConfigError::from)?;

		if scopes.is_empty() {
			return Err(ConfigError::EmptyScopeRequest.into());
		}

		*self.scopes.write() = scopes;

		Ok(())
	}

	/// Current sign-in state.
	pub fn state(&self) -> ProviderState {
		*self.state.borrow()
	}

	/// Subscribes to sign-in state changes.
	pub fn subscribe(&self) -> watch::Receiver<ProviderState> {
		self.state.subscribe()
	}

	/// Acquires a token for the default scopes.
	pub async fn get_access_token(&self) -> Result<AccessToken> {
		let scopes = self.scopes();

		self.acquire(&scopes).await
	}

	/// Acquires a token for `scopes`, falling back to the default scopes when none are given.
	pub async fn get_access_token_for<I, S>(&self, scopes: I) -> Result<AccessToken>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let requested = ScopeRequest::new(scopes).map_err(ConfigError::from)?;
		let scopes = if requested.is_empty() { self.scopes() } else { requested };

		self.acquire(&scopes).await
	}

	/// Attempts a silent sign-in for the default scopes and reports the resulting state.
	pub async fn try_silent_sign_in(&self) -> ProviderState {
		let scopes = self.scopes();
		let span = FlowSpan::new(FlowKind::Silent, "try_silent_sign_in");

		obs::record_flow_outcome(FlowKind::Silent, FlowOutcome::Attempt);

		let result = span.instrument(self.silent.fetch_silent(&scopes)).await;

		obs::record_result(FlowKind::Silent, &result);

		let state = if result.is_ok() { ProviderState::SignedIn } else { ProviderState::SignedOut };

		self.set_state(state);

		state
	}

	/// Signs the user in with an account picker for the default scopes.
	///
	/// Concurrent calls run one at a time. A redirect-based login leaves the state untouched;
	/// it is resolved later through [`handle_redirect_response`](Self::handle_redirect_response).
	pub async fn login(&self) -> Result<ProviderState> {
		let _guard = self.login_guard.lock().await;
		let request = InteractionRequest::new(self.scopes())
			.with_login_hint(self.config.login_hint.clone())
			.with_prompt(Prompt::SelectAccount);
		let span = FlowSpan::new(FlowKind::Login, "login");

		obs::record_flow_outcome(FlowKind::Login, FlowOutcome::Attempt);

		let result = span.instrument(self.interactive.login(&request)).await;

		obs::record_result(FlowKind::Login, &result);

		match result.map_err(Error::InteractionFailed)? {
			InteractiveOutcome::Completed(response) => {
				let state = if response.account.is_some() {
					ProviderState::SignedIn
				} else {
					ProviderState::SignedOut
				};

				self.set_state(state);

				Ok(state)
			},
			InteractiveOutcome::Redirected => Ok(self.state()),
		}
	}

	/// Signs the user out; the state becomes [`ProviderState::SignedOut`] even if the
	/// fetcher reports an error.
	pub async fn logout(&self) -> Result<()> {
		let span = FlowSpan::new(FlowKind::Logout, "logout");

		obs::record_flow_outcome(FlowKind::Logout, FlowOutcome::Attempt);

		let result = span.instrument(self.interactive.logout()).await;

		obs::record_result(FlowKind::Logout, &result);
		self.set_state(ProviderState::SignedOut);

		result.map_err(Error::InteractionFailed)
	}

	/// Completes a redirect round trip.
	///
	/// A successful sign-in response moves the state to [`ProviderState::SignedIn`]. A failed
	/// response marks the scopes of the pending redirect as denied. Either way the recorded
	/// redirect scopes are cleared.
	pub async fn handle_redirect_response(
		&self,
		response: Result<RedirectResponse, AuthError>,
	) -> Result<()> {
		match response {
			Ok(response) =>
				if response.kind == ResponseKind::IdToken {
					self.set_state(ProviderState::SignedIn);
				},
			Err(_) =>
				if let Some(requested) = self.ledger.requested_scopes().await? {
					self.ledger.add_denied_scopes(requested).await?;
				},
		}

		self.ledger.clear_requested_scopes().await?;

		Ok(())
	}

	async fn acquire(&self, scopes: &ScopeRequest) -> Result<AccessToken> {
		let span = FlowSpan::new(FlowKind::Silent, "get_access_token");

		obs::record_flow_outcome(FlowKind::Silent, FlowOutcome::Attempt);

		let result = span.instrument(self.silent.fetch_silent(scopes)).await;

		obs::record_result(FlowKind::Silent, &result);

		let e = match result {
			Ok(token) => return Ok(token),
			Err(e) => e,
		};

		if !self.classifier.classify(&e).requires_interaction() {
			self.set_state(ProviderState::SignedOut);

			return Err(Error::Terminal(e));
		}
		if self.config.fail_on_denied_scopes && self.ledger.are_scopes_denied(scopes).await? {
			return Err(Error::ScopesDenied { scopes: scopes.normalized() });
		}

		self.coalescer.enqueue_request(scopes)?.wait().await
	}

	fn set_state(&self, next: ProviderState) {
		let mut previous = next;
		let changed = self.state.send_if_modified(|current| {
			if *current == next {
				return false;
			}

			previous = std::mem::replace(current, next);

			true
		});

		if changed {
			obs::state_changed(previous, next);
		}
	}
}
impl Debug for TokenProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenProvider")
			.field("config", &self.config)
			.field("scopes", &*self.scopes.read())
			.field("state", &self.state())
			.field("coalescer", &self.coalescer)
			.finish()
	}
}

/// Records the scopes of each redirect round in the session ledger before handing off.
struct LedgerRecordingFetcher {
	inner: Arc<dyn InteractiveTokenFetcher>,
	ledger: ScopeLedger,
}
impl InteractiveTokenFetcher for LedgerRecordingFetcher {
	fn fetch_interactive<'a>(
		&'a self,
		request: &'a InteractionRequest,
	) -> FetchFuture<'a, InteractiveOutcome> {
		Box::pin(async move {
			if let Err(e) = self.ledger.set_requested_scopes(&request.scopes).await {
				obs::session_store_failed("record_requested_scopes", &e);
			}

			let outcome = self.inner.fetch_interactive(request).await;

			// Only a page redirect leaves a callback behind that still needs the scopes.
			if !matches!(outcome, Ok(InteractiveOutcome::Redirected))
				&& let Err(e) = self.ledger.clear_requested_scopes().await
			{
				obs::session_store_failed("clear_requested_scopes", &e);
			}

			outcome
		})
	}
}

fn build_coalescer(
	config: &BrokerConfig,
	interactive: &Arc<dyn InteractiveTokenFetcher>,
	ledger: &ScopeLedger,
) -> InteractionCoalescer {
	let fetcher: Arc<dyn InteractiveTokenFetcher> = match config.login_type {
		LoginType::Popup => Arc::clone(interactive),
		LoginType::Redirect => Arc::new(LedgerRecordingFetcher {
			inner: Arc::clone(interactive),
			ledger: ledger.clone(),
		}),
	};

	InteractionCoalescer::new(fetcher, config.coalescer_options())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{auth::ClientId, fetch::AuthResponse};

	struct Silent(std::result::Result<(), &'static str>);
	impl SilentTokenFetcher for Silent {
		fn fetch_silent<'a>(&'a self, scopes: &'a ScopeRequest) -> FetchFuture<'a, AccessToken> {
			Box::pin(async move {
				match self.0 {
					Ok(()) => Ok(AccessToken::new(format!("silent:{scopes}"))),
					Err(code) => Err(AuthError::new(code, "fixture")),
				}
			})
		}
	}

	struct Popup;
	impl InteractiveTokenFetcher for Popup {
		fn fetch_interactive<'a>(
			&'a self,
			request: &'a InteractionRequest,
		) -> FetchFuture<'a, InteractiveOutcome> {
			Box::pin(async move {
				Ok(InteractiveOutcome::Completed(
					AuthResponse::new(AccessToken::new(format!("popup:{}", request.scopes)))
						.with_account("adele@contoso.test"),
				))
			})
		}
	}

	fn provider(silent: Silent, login_type: LoginType) -> TokenProvider {
		let config = BrokerConfig::builder(ClientId::new("client-a").expect("Valid client id."))
			.login_type(login_type)
			.build()
			.expect("Fixture config should build.");

		TokenProvider::new(config, Arc::new(silent), Arc::new(Popup))
	}

	#[test]
	fn state_labels_are_stable() {
		assert_eq!(ProviderState::default(), ProviderState::Loading);
		assert_eq!(ProviderState::SignedOut.to_string(), "signed_out");
	}

	#[tokio::test]
	async fn terminal_failures_sign_the_user_out() {
		let provider = provider(Silent(Err("temporarily_unavailable")), LoginType::Popup);

		match provider.get_access_token().await {
			Err(Error::Terminal(e)) => assert_eq!(e.code, "temporarily_unavailable"),
			other => panic!("Unexpected outcome: {other:?}."),
		}

		assert_eq!(provider.state(), ProviderState::SignedOut);
	}

	#[tokio::test(start_paused = true)]
	async fn completed_redirect_rounds_leave_no_requested_scopes() {
		let provider = provider(Silent(Err("consent_required")), LoginType::Redirect);

		provider
			.ledger()
			.set_requested_scopes(&ScopeRequest::new(["files.read"]).expect("Valid scopes."))
			.await
			.expect("Ledger write should succeed.");

		let token =
			provider.get_access_token_for(["Mail.Read"]).await.expect("Popup fixture succeeds.");

		assert_eq!(token.expose(), "popup:mail.read");
		assert_eq!(
			provider.ledger().requested_scopes().await.expect("Ledger read should succeed."),
			None
		);
	}

	#[test]
	fn update_scopes_rejects_empty_lists() {
		let provider = provider(Silent(Ok(())), LoginType::Popup);

		assert!(matches!(
			provider.update_scopes(Vec::<String>::new()),
			Err(Error::Config(ConfigError::EmptyScopeRequest))
		));

		provider.update_scopes(["Files.Read", "files.read"]).expect("Scopes should be valid.");

		assert_eq!(provider.scopes().as_slice(), ["files.read".to_owned()]);
	}
}
