//! Broker-level error types shared across the coalescer, provider, fetchers, and stores.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Session storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Silent acquisition failed for a reason user interaction cannot fix.
	#[error("Silent token acquisition failed.")]
	Terminal(#[source] AuthError),
	/// The interactive round this request joined failed.
	#[error("Interactive token acquisition failed.")]
	InteractionFailed(#[source] AuthError),
	/// The interactive round was handed off to a full-page redirect.
	#[error("Interactive token acquisition continues through a redirect.")]
	InteractionRedirected,
	/// The interactive round was torn down before producing an outcome.
	#[error("Interactive round ended before producing an outcome.")]
	InteractionAbandoned,
	/// Requested scopes were denied by the user in an earlier redirect round.
	#[error("Scopes were previously denied: {scopes}.")]
	ScopesDenied {
		/// Space-delimited scopes that were requested.
		scopes: String,
	},
}
impl Error {
	/// Returns the provider error carried by this error, if any.
	pub fn auth_error(&self) -> Option<&AuthError> {
		match self {
			Self::Terminal(e) | Self::InteractionFailed(e) => Some(e),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Client or tenant identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Interactive acquisition needs at least one scope.
	#[error("Interactive acquisition requires at least one scope.")]
	EmptyScopeRequest,
	/// Authority cannot be parsed.
	#[error("Authority URL is invalid.")]
	InvalidAuthority {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Authority must use HTTPS.
	#[error("The authority must use HTTPS: {url}.")]
	InsecureAuthority {
		/// Authority URL that failed validation.
		url: String,
	},
	/// Serialized configuration could not be parsed.
	#[error("Broker configuration is malformed.")]
	Malformed {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Debounce timers need a tokio runtime.
	#[error("Interactive acquisition must run inside a tokio runtime.")]
	RuntimeUnavailable,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Error object reported by the identity library for a token call.
///
/// The `code` field carries the library's error code (for example
/// `interaction_required` or `invalid_grant:consent_required`) and drives
/// [`classify`](crate::classify) decisions; `message` is free-form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("{code}: {message}")]
pub struct AuthError {
	/// Library- or provider-supplied error code.
	pub code: String,
	/// Human-readable description.
	pub message: String,
}
impl AuthError {
	/// Creates a new error from a code and message.
	pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { code: code.into(), message: message.into() }
	}
}
