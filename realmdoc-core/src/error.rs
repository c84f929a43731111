//! Errors surfaced by document operations.

use crate::auth::AuthError;
use crate::schema::SchemaError;
use crate::state::DocumentState;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// An operation was called in a state it does not resolve.
    #[error("Cannot {operation} while the document is in state '{state}'")]
    WrongState {
        operation: &'static str,
        state: DocumentState,
    },

    #[error("Only remote documents can authenticate")]
    NotRemote,

    #[error("No store has been prepared for this document")]
    NoStore,
}

impl DocumentError {
    /// User-facing message.
    pub fn message(&self) -> String {
        match self {
            DocumentError::Auth(err) => err.message.clone(),
            other => other.to_string(),
        }
    }

    /// What the user can do about it, if anything.
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            DocumentError::Auth(err) => err.recovery_suggestion.clone(),
            DocumentError::Store(err) if err.is_access_denied() => {
                Some("Enter the encryption key for this store.".to_string())
            }
            DocumentError::Store(StoreError::UnsupportedVersion { .. }) => {
                Some("Open this store with a newer version of realmdoc.".to_string())
            }
            DocumentError::Schema(_) => {
                Some("Check your connection and try signing in again.".to_string())
            }
            _ => None,
        }
    }

    /// Returns true if the error was a wrong or missing encryption key.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, DocumentError::Store(err) if err.is_access_denied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_text_passes_through() {
        let err: DocumentError = AuthError::new("d", 1, "nope")
            .with_recovery_suggestion("retry")
            .into();
        assert_eq!(err.message(), "nope");
        assert_eq!(err.recovery_suggestion().as_deref(), Some("retry"));
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn test_wrong_state_message() {
        let err = DocumentError::WrongState {
            operation: "resume with an encryption key",
            state: DocumentState::Loaded,
        };
        assert_eq!(
            err.to_string(),
            "Cannot resume with an encryption key while the document is in state 'loaded'"
        );
        assert!(err.recovery_suggestion().is_none());
    }

    #[test]
    fn test_access_denied_suggestion() {
        let err: DocumentError = StoreError::AccessDenied("locked".into()).into();
        assert!(err.is_access_denied());
        assert!(err.recovery_suggestion().is_some());
    }
}
