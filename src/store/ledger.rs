//! Requested and denied scope bookkeeping for redirect-based consent.

// std
use std::collections::HashSet;
// self
use crate::{
	_prelude::*,
	auth::ScopeRequest,
	store::{SessionStore, StoreError},
};

/// Session key holding the scopes handed to an in-progress redirect flow.
pub const REQUESTED_SCOPES_KEY: &str = "mgt-requested-scopes";
/// Session key holding the scopes the user declined.
pub const DENIED_SCOPES_KEY: &str = "mgt-denied-scopes";

/// Scopes that are part of every sign-in and never count as denied.
const SIGN_IN_SCOPES: [&str; 2] = ["openid", "profile"];

/// Reads and writes scope lists stored as JSON arrays in a [`SessionStore`].
#[derive(Clone)]
pub struct ScopeLedger {
	store: Arc<dyn SessionStore>,
}
impl ScopeLedger {
	/// Wraps the provided session store.
	pub fn new(store: Arc<dyn SessionStore>) -> Self {
		Self { store }
	}

	/// Records the scopes of a redirect flow so the callback can attribute a failure.
	pub async fn set_requested_scopes(&self, scopes: &ScopeRequest) -> Result<(), StoreError> {
		self.write(REQUESTED_SCOPES_KEY, scopes.as_slice()).await
	}

	/// Scopes recorded by [`set_requested_scopes`](Self::set_requested_scopes), if any.
	pub async fn requested_scopes(&self) -> Result<Option<Vec<String>>, StoreError> {
		self.read(REQUESTED_SCOPES_KEY).await
	}

	/// Forgets the recorded redirect scopes.
	pub async fn clear_requested_scopes(&self) -> Result<(), StoreError> {
		self.store.remove(REQUESTED_SCOPES_KEY).await
	}

	/// Merges `scopes` into the denied set, skipping sign-in scopes and duplicates.
	pub async fn add_denied_scopes<I, S>(&self, scopes: I) -> Result<(), StoreError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut denied = self.denied_scopes().await?;
		let mut seen = denied.iter().cloned().collect::<HashSet<_>>();

		for scope in scopes {
			let scope = scope.into();

			if SIGN_IN_SCOPES.contains(&scope.as_str()) || !seen.insert(scope.clone()) {
				continue;
			}

			denied.push(scope);
		}

		denied.retain(|scope| !SIGN_IN_SCOPES.contains(&scope.as_str()));

		self.write(DENIED_SCOPES_KEY, &denied).await
	}

	/// Scopes the user declined during this session.
	pub async fn denied_scopes(&self) -> Result<Vec<String>, StoreError> {
		Ok(self.read(DENIED_SCOPES_KEY).await?.unwrap_or_default())
	}

	/// Returns true when any of `scopes` was declined earlier.
	pub async fn are_scopes_denied(&self, scopes: &ScopeRequest) -> Result<bool, StoreError> {
		let denied = self.denied_scopes().await?;

		Ok(denied.iter().any(|scope| scopes.contains(scope)))
	}

	/// Forgets every declined scope.
	pub async fn clear_denied_scopes(&self) -> Result<(), StoreError> {
		self.store.remove(DENIED_SCOPES_KEY).await
	}

	async fn read(&self, key: &str) -> Result<Option<Vec<String>>, StoreError> {
		let Some(raw) = self.store.get(key).await? else {
			return Ok(None);
		};
		let mut deserializer = serde_json::Deserializer::from_str(&raw);

		serde_path_to_error::deserialize(&mut deserializer).map(Some).map_err(|e| {
			StoreError::Serialization {
				message: format!("Failed to parse {key} at {}: {}", e.path(), e.inner()),
			}
		})
	}

	async fn write(&self, key: &str, scopes: &[String]) -> Result<(), StoreError> {
		let payload = serde_json::to_string(scopes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize {key}: {e}"),
		})?;

		self.store.set(key, payload).await
	}
}
impl Debug for ScopeLedger {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ScopeLedger").finish_non_exhaustive()
	}
}
