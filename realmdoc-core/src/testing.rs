//! In-memory fakes for the capability traits, shared by unit tests.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use url::Url;

use crate::auth::{AuthError, Authenticator, Credential, Session, SyncUser};
use crate::location::SyncUrl;
use crate::sandbox::{SandboxAccess, ScopedAccess};
use crate::schema::{Schema, SchemaError, SchemaLoader};
use crate::state::DocumentState;
use crate::store::{EncryptionKey, Store, StoreEngine, StoreError};

// ==================== Sessions ====================

#[derive(Debug)]
pub struct FakeSession {
    identity: String,
    token: String,
    valid: AtomicBool,
    log_outs: AtomicUsize,
}

impl FakeSession {
    pub fn new(identity: &str) -> Self {
        Self::with_token(identity, &format!("tok-{}", identity))
    }

    pub fn with_token(identity: &str, token: &str) -> Self {
        Self {
            identity: identity.to_string(),
            token: token.to_string(),
            valid: AtomicBool::new(true),
            log_outs: AtomicUsize::new(0),
        }
    }

    /// Simulates server-side expiry without a log out.
    pub fn expire(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub fn log_outs(&self) -> usize {
        self.log_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for FakeSession {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn access_token(&self) -> &str {
        &self.token
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn log_out(&self) {
        self.log_outs.fetch_add(1, Ordering::SeqCst);
        self.valid.store(false, Ordering::SeqCst);
    }
}

// ==================== Sandbox ====================

/// Counters shared between a [`FakeAccess`] and the test that created it.
#[derive(Debug, Clone, Default)]
pub struct AccessCounters {
    started: Arc<AtomicUsize>,
    stopped: Arc<AtomicUsize>,
    watched_at_stop: Arc<Mutex<Option<bool>>>,
}

impl AccessCounters {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Whether the watched file still existed when access was stopped.
    pub fn watched_file_existed_at_stop(&self) -> Option<bool> {
        *self.watched_at_stop.lock().unwrap()
    }
}

#[derive(Debug)]
pub struct FakeAccess {
    directory: PathBuf,
    refuse: bool,
    watch: Option<PathBuf>,
    counters: AccessCounters,
}

impl FakeAccess {
    pub fn new(directory: impl Into<PathBuf>) -> (Self, AccessCounters) {
        let counters = AccessCounters::default();
        let access = Self {
            directory: directory.into(),
            refuse: false,
            watch: None,
            counters: counters.clone(),
        };
        (access, counters)
    }

    /// A grant that no longer starts, like one revoked after being handed out.
    pub fn refusing(directory: impl Into<PathBuf>) -> (Self, AccessCounters) {
        let (mut access, counters) = Self::new(directory);
        access.refuse = true;
        (access, counters)
    }

    /// Records whether `path` exists at the moment access is stopped.
    pub fn watching(mut self, path: impl Into<PathBuf>) -> Self {
        self.watch = Some(path.into());
        self
    }
}

impl ScopedAccess for FakeAccess {
    fn directory(&self) -> &Path {
        &self.directory
    }

    fn start_accessing(&self) -> bool {
        if self.refuse {
            return false;
        }
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn stop_accessing(&self) {
        if let Some(path) = &self.watch {
            *self.counters.watched_at_stop.lock().unwrap() = Some(path.exists());
        }
        self.counters.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeSandbox {
    accessible: bool,
    grant: Mutex<Option<FakeAccess>>,
    requested: Mutex<Vec<PathBuf>>,
}

impl FakeSandbox {
    /// Every directory is accessible without a grant.
    pub fn open() -> Self {
        Self {
            accessible: true,
            grant: Mutex::new(None),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Nothing is accessible and the one request is answered with `access`.
    pub fn granting(access: FakeAccess) -> Self {
        Self {
            accessible: false,
            grant: Mutex::new(Some(access)),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Nothing is accessible and every request is denied.
    pub fn denying() -> Self {
        Self {
            accessible: false,
            grant: Mutex::new(None),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    /// Directories passed to `request_access`, in order.
    pub fn requested(&self) -> Vec<PathBuf> {
        self.requested.lock().unwrap().clone()
    }
}

impl SandboxAccess for FakeSandbox {
    fn is_accessible(&self, _directory: &Path) -> bool {
        self.accessible
    }

    fn request_access(&self, directory: &Path) -> Option<Box<dyn ScopedAccess>> {
        self.requested.lock().unwrap().push(directory.to_path_buf());
        self.grant
            .lock()
            .unwrap()
            .take()
            .map(|access| Box::new(access) as Box<dyn ScopedAccess>)
    }
}

/// Spells `path` relative to the current directory, climbing to the root
/// with `..` first.
pub fn relative_to_cwd(path: &Path) -> PathBuf {
    let cwd = std::env::current_dir().unwrap();
    let mut relative: PathBuf = cwd
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .map(|_| Component::ParentDir)
        .collect();
    relative.extend(
        path.components()
            .filter(|c| matches!(c, Component::Normal(_))),
    );
    assert!(relative.is_relative());
    relative
}

// ==================== Authentication ====================

pub const GOOD_TOKEN: &str = "good-token";
/// Access token the fake server answers with HTTP 503.
pub const UNAVAILABLE_TOKEN: &str = "server-down";

/// Accepts `alice`/`secret` and [`GOOD_TOKEN`]; rejects everything else
/// with HTTP 400, except [`UNAVAILABLE_TOKEN`] which gets 503.
#[derive(Default)]
pub struct FakeAuthenticator {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    observer: Mutex<Option<watch::Receiver<DocumentState>>>,
    observed: Mutex<Vec<DocumentState>>,
    servers: Mutex<Vec<Url>>,
}

impl FakeAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the document state seen while each authentication runs.
    pub fn observe(&self, receiver: watch::Receiver<DocumentState>) {
        *self.observer.lock().unwrap() = Some(receiver);
    }

    pub fn observed(&self) -> Vec<DocumentState> {
        self.observed.lock().unwrap().clone()
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn servers(&self) -> Vec<Url> {
        self.servers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(
        &self,
        credential: &Credential,
        auth_server: &Url,
    ) -> Result<SyncUser, AuthError> {
        let seen = self.observer.lock().unwrap().as_ref().map(|rx| *rx.borrow());
        if let Some(state) = seen {
            self.observed.lock().unwrap().push(state);
        }
        self.servers.lock().unwrap().push(auth_server.clone());
        tokio::task::yield_now().await;

        let identity = match credential {
            Credential::Password { username, password }
                if username == "alice" && password == "secret" =>
            {
                "alice"
            }
            Credential::AccessToken(token) if token == GOOD_TOKEN => "token-user",
            Credential::AccessToken(token) if token == UNAVAILABLE_TOKEN => {
                return Err(AuthError::new("test.auth", 503, "service unavailable").with_status(503));
            }
            _ => {
                return Err(AuthError::new("test.auth", 611, "invalid_grant")
                    .with_status(400)
                    .with_recovery_suggestion("server text"));
            }
        };

        let session = Arc::new(FakeSession::new(identity));
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

// ==================== Schema ====================

#[derive(Default)]
pub struct FakeSchemaLoader {
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeSchemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaLoader for FakeSchemaLoader {
    async fn load_schema(
        &self,
        _sync_url: &SyncUrl,
        _user: &SyncUser,
    ) -> Result<Schema, SchemaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(SchemaError::Status(503));
        }
        Ok(Schema::default())
    }
}

// ==================== Stores ====================

/// Engine whose stores never connect.
pub struct FailingEngine;

#[derive(Debug)]
struct FailingStore;

impl StoreEngine for FailingEngine {
    fn new_local(&self, _path: &Path) -> Box<dyn Store> {
        Box::new(FailingStore)
    }

    fn new_remote(&self, _sync_url: &SyncUrl, _user: &SyncUser) -> Box<dyn Store> {
        Box::new(FailingStore)
    }
}

impl Store for FailingStore {
    fn requires_format_upgrade(&self) -> bool {
        false
    }

    fn set_encryption_key(&mut self, _key: EncryptionKey) {}

    fn connect(&mut self) -> Result<(), StoreError> {
        Err(StoreError::Other("connection refused".to_string()))
    }

    fn is_connected(&self) -> bool {
        false
    }
}
