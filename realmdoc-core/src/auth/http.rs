//! HTTP authentication against a realmdoc auth server.
//!
//! `POST {auth_server}/auth` with `{ provider, data, password? }`.
//! A 2xx response carries `{ identity, access_token, expires_at? }`;
//! anything else carries `{ code, title, hint? }`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{AuthError, Authenticator, Credential, Session, SyncUser};

/// Error domain for failures reported by the auth server.
pub const AUTH_DOMAIN: &str = "realmdoc.auth";
/// Error domain for failures reaching the auth server.
pub const HTTP_DOMAIN: &str = "realmdoc.http";

const TRANSPORT_ERROR_CODE: i64 = -1;

/// Upper bound on a token revocation request.
const REVOKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct AuthRequest<'a> {
    provider: &'a str,
    data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
}

#[derive(Deserialize)]
struct AuthResponse {
    identity: String,
    access_token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct AuthFailure {
    code: i64,
    title: String,
    #[serde(default)]
    hint: Option<String>,
}

/// Joins `path` onto `base`, keeping any path prefix `base` already has.
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

fn transport_error(e: reqwest::Error) -> AuthError {
    AuthError::new(HTTP_DOMAIN, TRANSPORT_ERROR_CODE, e.to_string())
        .with_recovery_suggestion("Check your network connection and the auth server URL.")
}

/// Authenticator that talks to the auth server over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
}

impl HttpAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(
        &self,
        credential: &Credential,
        auth_server: &Url,
    ) -> Result<SyncUser, AuthError> {
        let body = match credential {
            Credential::Password { username, password } => AuthRequest {
                provider: credential.provider(),
                data: username,
                password: Some(password),
            },
            Credential::AccessToken(token) => AuthRequest {
                provider: credential.provider(),
                data: token,
                password: None,
            },
        };

        let response = self
            .client
            .post(endpoint(auth_server, "auth"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error = match response.json::<AuthFailure>().await {
                Ok(failure) => {
                    let err = AuthError::new(AUTH_DOMAIN, failure.code, failure.title);
                    match failure.hint {
                        Some(hint) => err.with_recovery_suggestion(hint),
                        None => err,
                    }
                }
                Err(_) => AuthError::new(
                    AUTH_DOMAIN,
                    i64::from(status.as_u16()),
                    format!("Server returned status {}", status),
                ),
            };
            return Err(error.with_status(status.as_u16()));
        }

        let auth: AuthResponse = response.json().await.map_err(transport_error)?;
        tracing::debug!(identity = %auth.identity, "authenticated");

        Ok(Arc::new(HttpSession::new(
            auth.identity,
            auth.access_token,
            auth.expires_at,
            auth_server.clone(),
            self.client.clone(),
        )))
    }
}

/// A session issued by the HTTP auth server.
pub struct HttpSession {
    identity: String,
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
    auth_server: Url,
    client: reqwest::Client,
    logged_out: AtomicBool,
}

impl HttpSession {
    pub(crate) fn new(
        identity: String,
        access_token: String,
        expires_at: Option<DateTime<Utc>>,
        auth_server: Url,
        client: reqwest::Client,
    ) -> Self {
        Self {
            identity,
            access_token,
            expires_at,
            auth_server,
            client,
            logged_out: AtomicBool::new(false),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn auth_server(&self) -> &Url {
        &self.auth_server
    }

    /// Marks the session logged out. Returns false if it already was.
    fn begin_log_out(&self) -> bool {
        if self.logged_out.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::info!(identity = %self.identity, "logging out");
        true
    }

    fn revocation(&self) -> reqwest::RequestBuilder {
        self.client
            .post(endpoint(&self.auth_server, "auth/revoke"))
            .bearer_auth(&self.access_token)
            .timeout(REVOKE_TIMEOUT)
    }
}

#[async_trait]
impl Session for HttpSession {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn access_token(&self) -> &str {
        &self.access_token
    }

    fn is_valid(&self) -> bool {
        if self.logged_out.load(Ordering::SeqCst) {
            return false;
        }
        self.expires_at.map_or(true, |at| Utc::now() < at)
    }

    fn log_out(&self) {
        if !self.begin_log_out() {
            return;
        }

        let request = self.revocation();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(send_revocation(request));
            }
            // Outside any runtime, revoke on a temporary one before returning.
            Err(_) => match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(send_revocation(request)),
                Err(e) => tracing::warn!("Token revocation skipped: {}", e),
            },
        }
    }

    async fn close(&self) {
        if self.begin_log_out() {
            send_revocation(self.revocation()).await;
        }
    }
}

async fn send_revocation(request: reqwest::RequestBuilder) {
    match request.send().await {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => tracing::warn!("Token revocation returned status {}", response.status()),
        Err(e) => tracing::warn!("Token revocation failed: {}", e),
    }
}

impl fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSession")
            .field("identity", &self.identity)
            .field("expires_at", &self.expires_at)
            .field("auth_server", &self.auth_server.as_str())
            .field("logged_out", &self.logged_out.load(Ordering::SeqCst))
            .finish()
    }
}
