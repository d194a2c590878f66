//! Session storage contracts and the built-in session stores.
//!
//! The broker keeps very little state across page loads or process restarts: the scopes
//! handed to an in-progress redirect flow and the scopes the user declined. Both live in
//! a [`SessionStore`] as JSON strings, managed by [`ScopeLedger`].

pub mod file;
pub mod ledger;
pub mod memory;

pub use file::FileStore;
pub use ledger::ScopeLedger;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Boxed future returned by session store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// String key-value storage scoped to one user session.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`, if any.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Deletes `key`; removing a missing key succeeds.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// A stored value could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// The storage backend failed.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
