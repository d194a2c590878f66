//! Refresh-token backed [`SilentTokenFetcher`] for Microsoft identity platform style
//! token endpoints.
//!
//! The fetcher keeps a single refresh token behind an async mutex so concurrent silent
//! calls never rotate it twice. Error payloads are folded into [`AuthError`] codes of the
//! form `error` or `error:suberror`, which keeps consent and interaction failures visible
//! to the default classifier (`invalid_grant:consent_required`).

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ClientId, ScopeRequest},
	config::BrokerConfig,
	error::ConfigError,
	fetch::{FetchFuture, SilentTokenFetcher},
};

/// Code reported when no refresh token is cached.
pub const LOGIN_REQUIRED: &str = "login_required";
/// Code reported for transport failures.
pub const NETWORK_ERROR: &str = "network_error";
/// Code reported for payloads that are not valid token responses.
pub const INVALID_RESPONSE: &str = "invalid_response";

const RESERVED_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

#[derive(Deserialize)]
#[cfg_attr(test, derive(Debug))]
struct TokenResponse {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct ErrorResponse {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
	#[serde(default)]
	suberror: Option<String>,
}

/// Silent fetcher that redeems a cached refresh token at the token endpoint.
pub struct RefreshTokenFetcher {
	client: ReqwestClient,
	token_endpoint: Url,
	client_id: ClientId,
	refresh_token: AsyncMutex<Option<String>>,
}
impl RefreshTokenFetcher {
	/// Builds a fetcher with its own reqwest client; redirects are never followed.
	pub fn new(client_id: ClientId, token_endpoint: Url) -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::from)?;

		Ok(Self::with_client(client, client_id, token_endpoint))
	}

	/// Builds a fetcher for the token endpoint derived from the configured authority.
	pub fn from_config(config: &BrokerConfig) -> Result<Self> {
		Self::new(config.client_id.clone(), config.token_endpoint()?)
	}

	/// Reuses a caller-provided reqwest client.
	pub fn with_client(client: ReqwestClient, client_id: ClientId, token_endpoint: Url) -> Self {
		Self { client, token_endpoint, client_id, refresh_token: AsyncMutex::new(None) }
	}

	/// Seeds the refresh token obtained by an earlier interactive sign-in.
	pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
		*self.refresh_token.get_mut() = Some(token.into());

		self
	}

	/// Replaces (or clears) the cached refresh token.
	pub async fn set_refresh_token(&self, token: Option<String>) {
		*self.refresh_token.lock().await = token;
	}

	/// Returns true while a refresh token is cached.
	pub async fn has_refresh_token(&self) -> bool {
		self.refresh_token.lock().await.is_some()
	}

	/// Token endpoint this fetcher posts to.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	async fn redeem(&self, scopes: &ScopeRequest) -> Result<AccessToken, AuthError> {
		let mut cached = self.refresh_token.lock().await;
		let Some(refresh_token) = cached.clone() else {
			return Err(AuthError::new(
				LOGIN_REQUIRED,
				"No refresh token is cached for the signed-in account.",
			));
		};
		let scope = scope_parameter(scopes);
		let form = [
			("grant_type", "refresh_token"),
			("client_id", self.client_id.as_ref()),
			("refresh_token", refresh_token.as_str()),
			("scope", scope.as_str()),
		];
		let response = self
			.client
			.post(self.token_endpoint.clone())
			.form(&form)
			.send()
			.await
			.map_err(network_error)?;
		let status = response.status();
		let body = response.bytes().await.map_err(network_error)?;

		if !status.is_success() {
			let failure = parse_json::<ErrorResponse>(&body).map_err(|_| {
				AuthError::new(
					INVALID_RESPONSE,
					format!("Token endpoint returned HTTP {} without an error payload.", status.as_u16()),
				)
			})?;

			if failure.error == "invalid_grant" && failure.suberror.is_none() {
				// Dead refresh token; the next silent call reports login_required.
				*cached = None;
			}

			let code = match failure.suberror.as_deref().filter(|s| !s.is_empty()) {
				Some(suberror) => format!("{}:{suberror}", failure.error),
				None => failure.error,
			};

			return Err(AuthError::new(code, failure.error_description.unwrap_or_default()));
		}

		let payload = parse_json::<TokenResponse>(&body)?;

		if let Some(rotated) = payload.refresh_token {
			*cached = Some(rotated);
		}

		let mut token = AccessToken::new(payload.access_token);

		if let Some(seconds) = payload.expires_in.filter(|seconds| *seconds > 0) {
			token = token
				.with_expires_at(OffsetDateTime::now_utc() + time::Duration::seconds(seconds));
		}

		Ok(token)
	}
}
impl SilentTokenFetcher for RefreshTokenFetcher {
	fn fetch_silent<'a>(&'a self, scopes: &'a ScopeRequest) -> FetchFuture<'a, AccessToken> {
		Box::pin(self.redeem(scopes))
	}
}
impl Debug for RefreshTokenFetcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshTokenFetcher")
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("client_id", &self.client_id)
			.finish()
	}
}

fn scope_parameter(scopes: &ScopeRequest) -> String {
	let mut value = scopes.normalized();

	for reserved in RESERVED_SCOPES {
		if !scopes.contains(reserved) {
			if !value.is_empty() {
				value.push(' ');
			}

			value.push_str(reserved);
		}
	}

	value
}

fn parse_json<T>(body: &[u8]) -> Result<T, AuthError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
		AuthError::new(
			INVALID_RESPONSE,
			format!("Token endpoint returned malformed JSON at `{}`: {}", e.path(), e.inner()),
		)
	})
}

fn network_error(e: ReqwestError) -> AuthError {
	AuthError::new(NETWORK_ERROR, e.to_string())
}
