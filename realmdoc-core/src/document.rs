//! The document-opening state machine.
//!
//! A [`Document`] owns everything needed to reach a connected store:
//! the store itself, an optional scoped sandbox grant for its directory and,
//! for sync stores, the login session. Opening pauses whenever the caller
//! has to supply something and is resumed with the matching operation:
//!
//! | State                   | Resume with                      |
//! |-------------------------|----------------------------------|
//! | `NeedsValidCredential`  | [`Document::authenticate`]       |
//! | `RequiresFormatUpgrade` | [`Document::resume_after_format_upgrade`] |
//! | `NeedsEncryptionKey`    | [`Document::resume_with_encryption_key`]  |
//!
//! Every path to `Loaded` goes through the same connect step.

use std::fmt;
use std::path::Path;

use tokio::sync::watch;
use url::Url;

use crate::auth::{Credential, SyncUser};
use crate::error::DocumentError;
use crate::location::{check_extension, StoreLocation, SyncUrl};
use crate::sandbox::ScopedResourceHandle;
use crate::services::Services;
use crate::state::DocumentState;
use crate::store::{EncryptionKey, Store};

/// A store together with the grant token that keeps its directory usable.
///
/// `store` is declared first so it is dropped before the token.
struct PresentedStore {
    store: Box<dyn Store>,
    _access: Option<ScopedResourceHandle>,
}

/// A store being opened, local or remote.
pub struct Document {
    location: StoreLocation,
    services: Services,
    state: watch::Sender<DocumentState>,
    store: Option<PresentedStore>,
    session: Option<SyncUser>,
    credential: Option<Credential>,
    access: Option<ScopedResourceHandle>,
}

impl Document {
    fn new(
        location: StoreLocation,
        services: Services,
        state: DocumentState,
        store: Option<PresentedStore>,
        access: Option<ScopedResourceHandle>,
    ) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            location,
            services,
            state,
            store,
            session: None,
            credential: None,
            access,
        }
    }

    /// Opens a local store file.
    ///
    /// Returns `Ok(None)` when the path is not a store file, does not exist,
    /// or lives in a directory the sandbox will not grant. Store errors other
    /// than a missing encryption key are returned as `Err`.
    pub fn open_local(path: &Path, services: Services) -> Result<Option<Self>, DocumentError> {
        if let Err(reason) = check_extension(path, &services.settings.store_extension) {
            tracing::info!(path = %path.display(), "not opening: {}", reason);
            return Ok(None);
        }
        if !path.is_file() {
            tracing::info!(path = %path.display(), "not opening: no such store file");
            return Ok(None);
        }

        // Grants are keyed on the absolute directory, never on a cwd-relative one.
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let directory = match parent.canonicalize() {
            Ok(directory) => directory,
            Err(e) => {
                tracing::warn!(directory = %parent.display(), "Failed to resolve directory: {}", e);
                return Ok(None);
            }
        };
        let directory = directory.as_path();

        let access = if services.sandbox.is_accessible(directory) {
            None
        } else {
            let Some(grant) = services.sandbox.request_access(directory) else {
                tracing::warn!(directory = %directory.display(), "sandbox access denied");
                return Ok(None);
            };
            let Some(handle) = ScopedResourceHandle::activate(grant) else {
                return Ok(None);
            };
            Some(handle)
        };

        let mut store = services.engine.new_local(path);
        let state = if store.requires_format_upgrade() {
            DocumentState::RequiresFormatUpgrade
        } else {
            match store.connect() {
                Ok(()) => DocumentState::Loaded,
                Err(e) if e.is_access_denied() => DocumentState::NeedsEncryptionKey,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to open store: {}", e);
                    return Err(e.into());
                }
            }
        };

        tracing::info!(path = %path.display(), %state, "opened local document");
        let presented = PresentedStore {
            store,
            _access: access.clone(),
        };
        Ok(Some(Self::new(
            StoreLocation::Local(path.to_path_buf()),
            services,
            state,
            Some(presented),
            access,
        )))
    }

    /// Creates a document for a sync store, waiting for a credential.
    ///
    /// The auth server is derived from `sync_url` when not given.
    pub fn open_remote(sync_url: SyncUrl, auth_server: Option<Url>, services: Services) -> Self {
        let location = StoreLocation::remote(sync_url, auth_server);
        tracing::info!(sync_url = %location.display_name(), "opened remote document");
        Self::new(
            location,
            services,
            DocumentState::NeedsValidCredential,
            None,
            None,
        )
    }

    /// Creates a document for a sync store and authenticates right away.
    ///
    /// The document is returned whatever the outcome, together with the
    /// result of authenticating.
    pub async fn open_remote_with_credential(
        sync_url: SyncUrl,
        credential: Credential,
        auth_server: Option<Url>,
        services: Services,
    ) -> (Self, Result<(), DocumentError>) {
        let mut document = Self::open_remote(sync_url, auth_server, services);
        let result = document.authenticate(credential).await;
        (document, result)
    }

    /// Connects a store that is waiting on a format upgrade. Connecting
    /// performs the upgrade.
    pub fn resume_after_format_upgrade(&mut self) -> Result<(), DocumentError> {
        self.expect_state(
            "resume after a format upgrade",
            &[DocumentState::RequiresFormatUpgrade],
        )?;
        self.connect(DocumentState::UnrecoverableError)
    }

    /// Retries connecting with `key`.
    ///
    /// A wrong key leaves the document waiting for another one.
    pub fn resume_with_encryption_key(&mut self, key: EncryptionKey) -> Result<(), DocumentError> {
        self.expect_state(
            "resume with an encryption key",
            &[DocumentState::NeedsEncryptionKey],
        )?;
        if let Some(presented) = self.store.as_mut() {
            presented.store.set_encryption_key(key);
        }
        self.connect(DocumentState::NeedsEncryptionKey)
    }

    /// Logs in with `credential`, loads the remote schema and connects.
    ///
    /// Allowed while waiting for a credential, and for remote documents
    /// after an unrecoverable error. An authentication failure returns the
    /// document to `NeedsValidCredential`; errors whose status has an entry
    /// in the settings' translation table get its friendlier text.
    pub async fn authenticate(&mut self, credential: Credential) -> Result<(), DocumentError> {
        let (sync_url, auth_server) = match &self.location {
            StoreLocation::Remote {
                sync_url,
                auth_server,
            } => (sync_url.clone(), auth_server.clone()),
            StoreLocation::Local(_) => return Err(DocumentError::NotRemote),
        };
        self.expect_state(
            "authenticate",
            &[
                DocumentState::NeedsValidCredential,
                DocumentState::UnrecoverableError,
            ],
        )?;

        self.credential = Some(credential.clone());
        self.set_state(DocumentState::LoadingSchema);

        let authenticator = self.services.authenticator.clone();
        let user = match authenticator.authenticate(&credential, &auth_server).await {
            Ok(user) => user,
            Err(e) => {
                let e = self.services.settings.translations.apply(e);
                tracing::warn!(
                    domain = %e.domain,
                    code = e.code,
                    "Authentication failed: {}",
                    e.message
                );
                self.set_state(DocumentState::NeedsValidCredential);
                return Err(e.into());
            }
        };
        self.replace_session(user.clone());

        let schema_loader = self.services.schema_loader.clone();
        match schema_loader.load_schema(&sync_url, &user).await {
            Ok(schema) => {
                tracing::debug!(object_types = schema.object_types.len(), "schema loaded");
            }
            Err(e) => {
                tracing::warn!(sync_url = %sync_url, "Failed to load schema: {}", e);
                self.set_state(DocumentState::UnrecoverableError);
                return Err(e.into());
            }
        }

        self.store = Some(PresentedStore {
            store: self.services.engine.new_remote(&sync_url, &user),
            _access: None,
        });
        self.connect(DocumentState::UnrecoverableError)
    }

    /// Current state.
    pub fn state(&self) -> DocumentState {
        *self.state.borrow()
    }

    /// Receives every state transition from now on.
    pub fn subscribe(&self) -> watch::Receiver<DocumentState> {
        self.state.subscribe()
    }

    /// Name to show for this document.
    pub fn display_name(&self) -> String {
        self.location.display_name()
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Credential of the last authentication attempt.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn session(&self) -> Option<&SyncUser> {
        self.session.as_ref()
    }

    /// The presented store, once one exists.
    pub fn store(&self) -> Option<&dyn Store> {
        self.store.as_ref().map(|p| p.store.as_ref())
    }

    /// Tears the document down, waiting for the sync session to be revoked.
    ///
    /// Dropping a document also logs out, but revocation then runs in the
    /// background and is lost if the runtime shuts down first.
    pub async fn close(mut self) {
        if let Some(session) = self.session.take() {
            if session.is_valid() {
                session.close().await;
            }
        }
    }

    /// Connects the presented store. An access-denied failure moves to
    /// `on_access_denied`, anything else to `UnrecoverableError`.
    fn connect(&mut self, on_access_denied: DocumentState) -> Result<(), DocumentError> {
        let Some(presented) = self.store.as_mut() else {
            self.set_state(DocumentState::UnrecoverableError);
            return Err(DocumentError::NoStore);
        };

        match presented.store.connect() {
            Ok(()) => {
                self.set_state(DocumentState::Loaded);
                Ok(())
            }
            Err(e) => {
                let next = if e.is_access_denied() {
                    on_access_denied
                } else {
                    DocumentState::UnrecoverableError
                };
                tracing::warn!(document = %self.display_name(), "Failed to connect: {}", e);
                self.set_state(next);
                Err(e.into())
            }
        }
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[DocumentState],
    ) -> Result<(), DocumentError> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(DocumentError::WrongState { operation, state })
        }
    }

    fn set_state(&self, next: DocumentState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(
                document = %self.display_name(),
                from = %previous,
                to = %next,
                "state changed"
            );
        }
    }

    fn replace_session(&mut self, user: SyncUser) {
        if let Some(previous) = self.session.replace(user) {
            if previous.is_valid() {
                previous.log_out();
            }
        }
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if session.is_valid() {
                session.log_out();
            }
        }
        // The store still holds its own token, so the grant outlives it.
        if let Some(access) = self.access.take() {
            access.release_after(self.services.settings.release_delay);
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("location", &self.location)
            .field("state", &self.state())
            .field("store", &self.store.as_ref().map(|p| &p.store))
            .field("session", &self.session)
            .field("has_access", &self.access.is_some())
            .finish()
    }
}
