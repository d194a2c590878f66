//! Contracts for the identity library calls the broker builds on.
//!
//! The broker never talks to a browser or a consent screen itself. Hosts plug in a
//! [`SilentTokenFetcher`] (cache or refresh-token acquisition) and an
//! [`InteractiveTokenFetcher`] (popup, redirect, or system browser). Both report
//! failures as [`AuthError`] values so [`classify`](crate::classify) can route them.

#[cfg(feature = "reqwest")] pub mod refresh;

#[cfg(feature = "reqwest")] pub use refresh::RefreshTokenFetcher;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeRequest},
};

/// Boxed future returned by fetcher implementations.
pub type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthError>> + 'a + Send>>;

/// Acquires tokens without user interaction.
pub trait SilentTokenFetcher
where
	Self: Send + Sync,
{
	/// Attempts to acquire a token for exactly the provided scopes.
	fn fetch_silent<'a>(&'a self, scopes: &'a ScopeRequest) -> FetchFuture<'a, AccessToken>;
}

/// Acquires tokens through a user-visible flow.
pub trait InteractiveTokenFetcher
where
	Self: Send + Sync,
{
	/// Runs one interactive acquisition covering every scope in the request.
	fn fetch_interactive<'a>(
		&'a self,
		request: &'a InteractionRequest,
	) -> FetchFuture<'a, InteractiveOutcome>;

	/// Signs the user in. Defaults to [`fetch_interactive`](Self::fetch_interactive).
	fn login<'a>(&'a self, request: &'a InteractionRequest) -> FetchFuture<'a, InteractiveOutcome> {
		self.fetch_interactive(request)
	}

	/// Signs the user out. Defaults to a no-op.
	fn logout(&self) -> FetchFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}
}

/// `prompt` values forwarded to the authorization endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
	/// Always show the account picker.
	SelectAccount,
	/// Force the consent screen.
	Consent,
	/// Force credential entry.
	Login,
}
impl Prompt {
	/// Returns the protocol value.
	pub const fn as_str(self) -> &'static str {
		match self {
			Prompt::SelectAccount => "select_account",
			Prompt::Consent => "consent",
			Prompt::Login => "login",
		}
	}
}
impl Display for Prompt {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Parameters for one interactive call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionRequest {
	/// Union of scopes the call must cover.
	pub scopes: ScopeRequest,
	/// Account hint forwarded to the identity provider.
	pub login_hint: Option<String>,
	/// Optional prompt override.
	pub prompt: Option<Prompt>,
}
impl InteractionRequest {
	/// Creates a request for the provided scopes.
	pub fn new(scopes: ScopeRequest) -> Self {
		Self { scopes, login_hint: None, prompt: None }
	}

	/// Sets the login hint.
	pub fn with_login_hint(mut self, hint: Option<String>) -> Self {
		self.login_hint = hint;

		self
	}

	/// Sets the prompt override.
	pub fn with_prompt(mut self, prompt: Prompt) -> Self {
		self.prompt = Some(prompt);

		self
	}
}

/// Successful response from an interactive call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthResponse {
	/// Token covering the requested scopes.
	pub access_token: AccessToken,
	/// Signed-in account, if the library reports one.
	pub account: Option<String>,
}
impl AuthResponse {
	/// Creates a response without account details.
	pub fn new(access_token: AccessToken) -> Self {
		Self { access_token, account: None }
	}

	/// Attaches the signed-in account.
	pub fn with_account(mut self, account: impl Into<String>) -> Self {
		self.account = Some(account.into());

		self
	}
}

/// Result of an interactive call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractiveOutcome {
	/// The flow completed in-process (popup or loopback browser).
	Completed(AuthResponse),
	/// The flow continues through a full-page redirect and will not complete in-process.
	Redirected,
}

/// Kind of token delivered to a redirect callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
	/// Sign-in response carrying an ID token.
	IdToken,
	/// Access-token response for a consent round.
	AccessToken,
}

/// Response handed back to the provider after a redirect round trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectResponse {
	/// Token kind carried by the response.
	pub kind: ResponseKind,
	/// Signed-in account, if any.
	pub account: Option<String>,
}
