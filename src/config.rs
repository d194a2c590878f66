//! Broker configuration shared by the provider, coalescer, and HTTP fetcher.
//!
//! Configurations can be assembled in code through [`BrokerConfig::builder`] or loaded from
//! JSON with [`BrokerConfig::from_json_str`]; both paths run the same validation.

/// Builder API for assembling broker configurations.
pub mod builder;

pub use builder::*;

// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeRequest},
	coalesce::CoalescerOptions,
	error::ConfigError,
};

/// Scopes requested when neither the caller nor the configuration names any.
pub const DEFAULT_SCOPES: [&str; 1] = ["user.read"];
/// Authority host used when none is configured.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common";
/// Quiet period, in milliseconds, that closes a coalescing window.
pub const DEFAULT_INTERACTION_DEBOUNCE_MS: u64 = 200;

/// How interactive acquisition is surfaced to the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginType {
	/// In-process flow that completes with a token (popup, loopback browser).
	Popup,
	#[default]
	/// Full-page redirect; completion arrives through the redirect callback.
	Redirect,
}

/// Validated broker configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
	/// Application (client) identifier.
	pub client_id: ClientId,
	/// Scopes used when callers do not pass their own.
	#[serde(default = "default_scopes")]
	pub scopes: ScopeRequest,
	/// Authority (identity provider base URL including the directory segment).
	#[serde(default = "default_authority")]
	pub authority: Url,
	/// Interactive flow style.
	#[serde(default)]
	pub login_type: LoginType,
	/// Account hint forwarded to interactive calls.
	#[serde(default)]
	pub login_hint: Option<String>,
	/// Debounce window for coalescing interactive requests, in milliseconds.
	#[serde(default = "default_debounce_ms")]
	pub interaction_debounce_ms: u64,
	/// Upper bound on how long a coalescing window may stay open, in milliseconds.
	///
	/// `None` keeps the unbounded debounce: a steady stream of new scopes keeps delaying
	/// the round.
	#[serde(default)]
	pub max_interaction_delay_ms: Option<u64>,
	/// Reject requests for scopes the user denied in an earlier redirect round instead of
	/// prompting again.
	#[serde(default)]
	pub fail_on_denied_scopes: bool,
}
impl BrokerConfig {
	/// Creates a new builder for the provided client identifier.
	pub fn builder(client_id: ClientId) -> BrokerConfigBuilder {
		BrokerConfigBuilder::new(client_id)
	}

	/// Parses and validates a JSON configuration document.
	///
	/// An empty `scopes` list falls back to [`DEFAULT_SCOPES`], as the builder does.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);
		let mut config: Self = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ConfigError::Malformed { source })?;

		if config.scopes.is_empty() {
			config.scopes = default_scopes();
		}

		config.validate()?;

		Ok(config)
	}

	/// Debounce window as a [`Duration`].
	pub fn interaction_debounce(&self) -> Duration {
		Duration::from_millis(self.interaction_debounce_ms)
	}

	/// Maximum coalescing window as a [`Duration`], when bounded.
	pub fn max_interaction_delay(&self) -> Option<Duration> {
		self.max_interaction_delay_ms.map(Duration::from_millis)
	}

	/// OAuth 2.0 token endpoint below the authority (`{authority}/oauth2/v2.0/token`).
	pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
		let base = self.authority.as_str().trim_end_matches('/');

		Url::parse(&format!("{base}/oauth2/v2.0/token"))
			.map_err(|source| ConfigError::InvalidAuthority { source })
	}

	/// Coalescer options derived from this configuration.
	pub fn coalescer_options(&self) -> CoalescerOptions {
		CoalescerOptions {
			debounce: self.interaction_debounce(),
			max_delay: self.max_interaction_delay(),
			login_hint: self.login_hint.clone(),
		}
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.authority.scheme() != "https" {
			return Err(ConfigError::InsecureAuthority { url: self.authority.to_string() });
		}

		Ok(())
	}
}

fn default_scopes() -> ScopeRequest {
	ScopeRequest::from_normalized(DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect())
}

fn default_authority() -> Url {
	Url::parse(DEFAULT_AUTHORITY).expect("Default authority literal must parse.")
}

fn default_debounce_ms() -> u64 {
	DEFAULT_INTERACTION_DEBOUNCE_MS
}
