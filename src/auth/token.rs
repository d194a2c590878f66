//! Access token wrapper that keeps secrets out of logs.

// self
use crate::_prelude::*;

/// Bearer access token returned by silent or interactive acquisition.
///
/// A single token may cover the union of several callers' scopes when it comes out of a
/// coalesced interactive round.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
	secret: String,
	expires_at: Option<OffsetDateTime>,
}
impl AccessToken {
	/// Wraps a raw token string.
	pub fn new(secret: impl Into<String>) -> Self {
		Self { secret: secret.into(), expires_at: None }
	}

	/// Attaches the expiry instant reported by the identity provider.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Returns the raw token. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.secret
	}

	/// Expiry instant, when known.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}

	/// Returns true once the provided instant reaches the known expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expiry| instant >= expiry)
	}
}
impl AsRef<str> for AccessToken {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
impl Display for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
