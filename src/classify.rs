//! Classification of silent acquisition failures.
//!
//! Only failures whose error code names a consent, interaction, or login requirement are
//! worth an interactive round; everything else (network failures, malformed responses,
//! unknown codes) is terminal and must reach the caller immediately.

// self
use crate::_prelude::*;

/// Error-code fragments that mark a failure as recoverable through user interaction.
pub const INTERACTION_REQUIRED_FRAGMENTS: [&str; 3] =
	["consent_required", "interaction_required", "login_required"];

/// Outcome of classifying a silent acquisition failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
	/// An interactive round can resolve the failure.
	RecoverableViaInteraction,
	/// The failure must be surfaced to the caller as-is.
	Terminal,
}
impl ErrorClass {
	/// Returns true for [`ErrorClass::RecoverableViaInteraction`].
	pub const fn requires_interaction(self) -> bool {
		matches!(self, Self::RecoverableViaInteraction)
	}
}

/// Strategy that decides whether a silent failure should trigger interactive acquisition.
pub trait InteractionClassifier
where
	Self: Send + Sync,
{
	/// Classifies the failure reported by the silent fetcher.
	fn classify(&self, error: &AuthError) -> ErrorClass;
}

/// Substring classifier over [`INTERACTION_REQUIRED_FRAGMENTS`] plus optional extras.
#[derive(Clone, Debug, Default)]
pub struct DefaultInteractionClassifier {
	extra_fragments: Vec<String>,
}
impl DefaultInteractionClassifier {
	/// Adds a fragment that should also count as interaction-required.
	pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
		self.extra_fragments.push(fragment.into());

		self
	}
}
impl InteractionClassifier for DefaultInteractionClassifier {
	fn classify(&self, error: &AuthError) -> ErrorClass {
		let code = error.code.as_str();

		if requires_interaction(error)
			|| self.extra_fragments.iter().any(|fragment| code.contains(fragment.as_str()))
		{
			ErrorClass::RecoverableViaInteraction
		} else {
			ErrorClass::Terminal
		}
	}
}

/// Returns true when the error code contains one of [`INTERACTION_REQUIRED_FRAGMENTS`].
///
/// An empty code never requires interaction.
pub fn requires_interaction(error: &AuthError) -> bool {
	let code = error.code.as_str();

	!code.is_empty() && INTERACTION_REQUIRED_FRAGMENTS.iter().any(|fragment| code.contains(fragment))
}
