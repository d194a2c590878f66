// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeRequest, TenantId},
	config::{BrokerConfig, DEFAULT_INTERACTION_DEBOUNCE_MS, LoginType},
	error::ConfigError,
};

/// Builder for [`BrokerConfig`] values.
#[derive(Debug)]
pub struct BrokerConfigBuilder {
	/// Application (client) identifier.
	pub client_id: ClientId,
	/// Default scopes; `None` keeps [`DEFAULT_SCOPES`](crate::config::DEFAULT_SCOPES).
	pub scopes: Option<ScopeRequest>,
	/// Explicit authority; wins over `tenant`.
	pub authority: Option<Url>,
	/// Directory segment appended to the Microsoft login host.
	pub tenant: TenantId,
	/// Interactive flow style.
	pub login_type: LoginType,
	/// Account hint forwarded to interactive calls.
	pub login_hint: Option<String>,
	/// Debounce window.
	pub interaction_debounce: Duration,
	/// Optional cap on the coalescing window.
	pub max_interaction_delay: Option<Duration>,
	/// Fail fast on previously denied scopes.
	pub fail_on_denied_scopes: bool,
}
impl BrokerConfigBuilder {
	/// Creates a builder seeded with defaults for the provided client identifier.
	pub fn new(client_id: ClientId) -> Self {
		Self {
			client_id,
			scopes: None,
			authority: None,
			tenant: TenantId::common(),
			login_type: LoginType::default(),
			login_hint: None,
			interaction_debounce: Duration::from_millis(DEFAULT_INTERACTION_DEBOUNCE_MS),
			max_interaction_delay: None,
			fail_on_denied_scopes: false,
		}
	}

	/// Sets the default scopes.
	pub fn scopes(mut self, scopes: ScopeRequest) -> Self {
		self.scopes = Some(scopes);

		self
	}

	/// Sets an explicit authority URL.
	pub fn authority(mut self, url: Url) -> Self {
		self.authority = Some(url);

		self
	}

	/// Sets the directory segment used when no explicit authority is given.
	pub fn tenant(mut self, tenant: TenantId) -> Self {
		self.tenant = tenant;

		self
	}

	/// Sets the interactive flow style.
	pub fn login_type(mut self, login_type: LoginType) -> Self {
		self.login_type = login_type;

		self
	}

	/// Sets the login hint.
	pub fn login_hint(mut self, hint: impl Into<String>) -> Self {
		self.login_hint = Some(hint.into());

		self
	}

	/// Overrides the debounce window (defaults to 200 ms).
	pub fn interaction_debounce(mut self, window: Duration) -> Self {
		self.interaction_debounce = window;

		self
	}

	/// Caps how long a coalescing window may stay open.
	pub fn max_interaction_delay(mut self, cap: Duration) -> Self {
		self.max_interaction_delay = Some(cap);

		self
	}

	/// Rejects previously denied scopes instead of prompting again.
	pub fn fail_on_denied_scopes(mut self, enabled: bool) -> Self {
		self.fail_on_denied_scopes = enabled;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<BrokerConfig, ConfigError> {
		let authority = match self.authority {
			Some(url) => url,
			None => Url::parse(&format!("https://login.microsoftonline.com/{}", self.tenant))
				.map_err(|source| ConfigError::InvalidAuthority { source })?,
		};
		let config = BrokerConfig {
			client_id: self.client_id,
			scopes: match self.scopes {
				Some(scopes) if !scopes.is_empty() => scopes,
				_ => super::default_scopes(),
			},
			authority,
			login_type: self.login_type,
			login_hint: self.login_hint,
			interaction_debounce_ms: saturating_millis(self.interaction_debounce),
			max_interaction_delay_ms: self.max_interaction_delay.map(saturating_millis),
			fail_on_denied_scopes: self.fail_on_denied_scopes,
		};

		config.validate()?;

		Ok(config)
	}
}

fn saturating_millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
