//! Credentials, login sessions and the authentication capability.

mod http;
mod translate;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

pub use http::{HttpAuthenticator, HttpSession, AUTH_DOMAIN, HTTP_DOMAIN};
pub(crate) use http::endpoint;
pub use translate::{
    ErrorTranslations, Translation, INVALID_CREDENTIAL_MESSAGE, INVALID_CREDENTIAL_SUGGESTION,
};

/// A logged-in identity on one authentication server.
#[async_trait]
pub trait Session: Send + Sync + fmt::Debug {
    fn identity(&self) -> &str;

    fn access_token(&self) -> &str;

    /// Returns false once the session has expired or been logged out.
    fn is_valid(&self) -> bool;

    /// Ends the session. Callers only do this while `is_valid` is true.
    ///
    /// Server-side revocation may still be in flight when this returns.
    fn log_out(&self);

    /// Ends the session and waits until the server has been told.
    async fn close(&self) {
        self.log_out();
    }
}

/// A shared, authenticated session used to reach sync stores.
pub type SyncUser = Arc<dyn Session>;

/// Something the caller presents to an authentication server.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password { username: String, password: String },
    AccessToken(String),
}

impl Credential {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Password {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Provider name sent to the authentication server.
    pub fn provider(&self) -> &'static str {
        match self {
            Credential::Password { .. } => "password",
            Credential::AccessToken(_) => "access_token",
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Credential::Password { username, .. } => Some(username),
            Credential::AccessToken(_) => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
        }
    }
}

/// Exchanges a credential for a session.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        credential: &Credential,
        auth_server: &Url,
    ) -> Result<SyncUser, AuthError>;
}

/// A failed authentication attempt.
///
/// `domain` and `code` identify the failure and are never rewritten.
/// `message` and `recovery_suggestion` are user-facing and may be replaced
/// by an [`ErrorTranslations`] table keyed on `status`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub domain: String,
    pub code: i64,
    /// HTTP status of the response, if one was received
    pub status: Option<u16>,
    pub message: String,
    pub recovery_suggestion: Option<String>,
}

impl AuthError {
    pub fn new(domain: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            code,
            status: None,
            message: message.into(),
            recovery_suggestion: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.recovery_suggestion = Some(suggestion.into());
        self
    }
}
