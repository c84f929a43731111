//! Document opening states.

use serde::Serialize;

/// Where a document is in its opening lifecycle.
///
/// Exactly one state is active at a time. Construction always leaves the
/// document in one of these; there is no observable "uninitialized" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    /// Remote store waiting for the caller to supply a credential
    NeedsValidCredential,
    /// Authentication or schema load in flight
    LoadingSchema,
    /// Local store in an older on-disk format; connecting will migrate it
    RequiresFormatUpgrade,
    /// Store refused access without (or with the wrong) encryption key
    NeedsEncryptionKey,
    /// Store connected and usable
    Loaded,
    /// Opening failed and cannot be resumed
    UnrecoverableError,
}

impl DocumentState {
    /// Returns true if the caller has to supply something to make progress.
    pub fn needs_input(&self) -> bool {
        matches!(
            self,
            DocumentState::NeedsValidCredential
                | DocumentState::RequiresFormatUpgrade
                | DocumentState::NeedsEncryptionKey
        )
    }

    /// Returns true if no further transition will happen on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentState::Loaded | DocumentState::UnrecoverableError
        )
    }
}

impl std::fmt::Display for DocumentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentState::NeedsValidCredential => write!(f, "needs valid credential"),
            DocumentState::LoadingSchema => write!(f, "loading schema"),
            DocumentState::RequiresFormatUpgrade => write!(f, "requires format upgrade"),
            DocumentState::NeedsEncryptionKey => write!(f, "needs encryption key"),
            DocumentState::Loaded => write!(f, "loaded"),
            DocumentState::UnrecoverableError => write!(f, "unrecoverable error"),
        }
    }
}
