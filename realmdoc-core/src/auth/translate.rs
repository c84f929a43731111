//! Status-keyed replacement text for authentication errors.

use std::collections::BTreeMap;

use super::AuthError;

/// Message shown when the server rejects a credential with HTTP 400.
pub const INVALID_CREDENTIAL_MESSAGE: &str = "The provided credentials are invalid.";

/// Suggestion shown alongside [`INVALID_CREDENTIAL_MESSAGE`].
pub const INVALID_CREDENTIAL_SUGGESTION: &str =
    "Please check the username and password and try again.";

/// Replacement user-facing text for one status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub message: String,
    pub recovery_suggestion: Option<String>,
}

/// Maps HTTP status codes to friendlier error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorTranslations {
    entries: BTreeMap<u16, Translation>,
}

impl ErrorTranslations {
    /// A table that rewrites nothing.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn with(
        mut self,
        status: u16,
        message: impl Into<String>,
        recovery_suggestion: Option<&str>,
    ) -> Self {
        self.insert(status, message, recovery_suggestion);
        self
    }

    pub fn insert(
        &mut self,
        status: u16,
        message: impl Into<String>,
        recovery_suggestion: Option<&str>,
    ) {
        self.entries.insert(
            status,
            Translation {
                message: message.into(),
                recovery_suggestion: recovery_suggestion.map(str::to_string),
            },
        );
    }

    pub fn lookup(&self, status: u16) -> Option<&Translation> {
        self.entries.get(&status)
    }

    /// Rewrites the user-facing text of `error` if its status has an entry.
    /// Domain, code and status are kept.
    pub fn apply(&self, mut error: AuthError) -> AuthError {
        if let Some(translation) = error.status.and_then(|s| self.lookup(s)) {
            error.message = translation.message.clone();
            error.recovery_suggestion = translation.recovery_suggestion.clone();
        }
        error
    }
}

impl Default for ErrorTranslations {
    fn default() -> Self {
        Self::empty().with(
            400,
            INVALID_CREDENTIAL_MESSAGE,
            Some(INVALID_CREDENTIAL_SUGGESTION),
        )
    }
}
