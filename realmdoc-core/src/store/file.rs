//! File-backed store engine.
//!
//! A store file is a CBOR container holding an Automerge document:
//!
//! ```text
//! {
//!   magic:          "realmdoc",
//!   format_version: u32,
//!   key_check:      optional SHA-256 of the encryption key,
//!   payload:        Automerge document bytes,
//! }
//! ```
//!
//! While connected, a companion `<file>.lock` sits next to the store and is
//! removed when the store is dropped. Sync stores are cached locally under
//! the engine's cache directory, one file per (identity, sync URL) pair.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use automerge::transaction::Transactable;
use automerge::AutoCommit;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256};

use super::{EncryptionKey, Store, StoreEngine, StoreError};
use crate::auth::SyncUser;
use crate::location::SyncUrl;
use crate::settings::DEFAULT_STORE_EXTENSION;

/// On-disk format written by this engine.
pub const CURRENT_FORMAT_VERSION: u32 = 3;

const MAGIC: &str = "realmdoc";
const LOCK_EXTENSION: &str = "lock";

#[derive(Debug, Serialize, Deserialize)]
struct Container {
    magic: String,
    format_version: u32,
    #[serde(default)]
    key_check: Option<ByteBuf>,
    payload: ByteBuf,
}

/// Store engine backed by container files on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStoreEngine {
    cache_dir: PathBuf,
}

impl FileStoreEngine {
    /// Creates an engine that caches sync stores under `cache_dir`.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    /// Returns the cache file used for `sync_url` on behalf of `identity`.
    pub fn cache_path(&self, sync_url: &SyncUrl, identity: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        hasher.update([0u8]);
        hasher.update(sync_url.as_str().as_bytes());
        let digest = hasher.finalize();

        self.cache_dir.join(format!(
            "{}.{}",
            bs58::encode(&digest[..16]).into_string(),
            DEFAULT_STORE_EXTENSION
        ))
    }

    /// Creates a new, empty store file at `path`.
    ///
    /// When `key` is given, the store refuses to connect without it.
    /// Fails if the file already exists.
    pub fn create(path: &Path, key: Option<&EncryptionKey>) -> Result<(), StoreError> {
        if path.exists() {
            return Err(StoreError::io(
                path,
                io::Error::new(io::ErrorKind::AlreadyExists, "store file already exists"),
            ));
        }
        write_container(path, &new_container(CURRENT_FORMAT_VERSION, key)?)
    }
}

impl StoreEngine for FileStoreEngine {
    fn new_local(&self, path: &Path) -> Box<dyn Store> {
        Box::new(FileStore::new(path.to_path_buf(), false))
    }

    fn new_remote(&self, sync_url: &SyncUrl, user: &SyncUser) -> Box<dyn Store> {
        Box::new(FileStore::new(
            self.cache_path(sync_url, user.identity()),
            true,
        ))
    }
}

/// A store file, opened by `connect`.
pub struct FileStore {
    path: PathBuf,
    create_if_missing: bool,
    key: Option<EncryptionKey>,
    doc: Option<AutoCommit>,
    lock_path: Option<PathBuf>,
}

impl FileStore {
    fn new(path: PathBuf, create_if_missing: bool) -> Self {
        Self {
            path,
            create_if_missing,
            key: None,
            doc: None,
            lock_path: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The Automerge document, once connected.
    pub fn document(&self) -> Option<&AutoCommit> {
        self.doc.as_ref()
    }

    fn load_container(&self) -> Result<Container, StoreError> {
        match read_container(&self.path) {
            Err(StoreError::Io { source, .. })
                if source.kind() == io::ErrorKind::NotFound && self.create_if_missing =>
            {
                let container = new_container(CURRENT_FORMAT_VERSION, self.key.as_ref())?;
                write_container(&self.path, &container)?;
                tracing::info!(path = %self.path.display(), "created local cache for sync store");
                Ok(container)
            }
            other => other,
        }
    }

    fn check_key(&self, container: &Container) -> Result<(), StoreError> {
        match (&container.key_check, &self.key) {
            (None, _) => Ok(()),
            (Some(_), None) => Err(StoreError::AccessDenied(
                "store is encrypted and no encryption key was supplied".to_string(),
            )),
            (Some(check), Some(key)) if check.as_slice() == key.fingerprint().as_slice() => Ok(()),
            (Some(_), Some(_)) => Err(StoreError::AccessDenied(
                "encryption key does not match this store".to_string(),
            )),
        }
    }
}

impl Store for FileStore {
    fn requires_format_upgrade(&self) -> bool {
        // Unreadable files are left for `connect` to report.
        match read_container(&self.path) {
            Ok(container) => container.format_version < CURRENT_FORMAT_VERSION,
            Err(_) => false,
        }
    }

    fn set_encryption_key(&mut self, key: EncryptionKey) {
        self.key = Some(key);
    }

    fn connect(&mut self) -> Result<(), StoreError> {
        if self.doc.is_some() {
            return Ok(());
        }

        let mut container = self.load_container()?;

        if container.magic != MAGIC {
            return Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: "not a realmdoc store".to_string(),
            });
        }
        if container.format_version > CURRENT_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: container.format_version,
                supported: CURRENT_FORMAT_VERSION,
            });
        }

        self.check_key(&container)?;

        let doc = AutoCommit::load(&container.payload).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if container.format_version < CURRENT_FORMAT_VERSION {
            let from = container.format_version;
            container.format_version = CURRENT_FORMAT_VERSION;
            write_container(&self.path, &container)?;
            tracing::info!(
                path = %self.path.display(),
                from,
                to = CURRENT_FORMAT_VERSION,
                "upgraded store format"
            );
        }

        let lock_path = lock_path(&self.path);
        fs::write(&lock_path, std::process::id().to_string())
            .map_err(|e| StoreError::io(&lock_path, e))?;

        self.lock_path = Some(lock_path);
        self.doc = Some(doc);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.doc.is_some()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Some(lock_path) = self.lock_path.take() {
            if let Err(e) = fs::remove_file(&lock_path) {
                tracing::warn!(path = %lock_path.display(), "failed to remove store lock: {}", e);
            }
        }
    }
}

impl fmt::Debug for FileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("create_if_missing", &self.create_if_missing)
            .field("has_key", &self.key.is_some())
            .field("connected", &self.doc.is_some())
            .finish()
    }
}

/// Path of the companion lock file for a store file.
pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(LOCK_EXTENSION);
    PathBuf::from(name)
}

fn new_container(
    format_version: u32,
    key: Option<&EncryptionKey>,
) -> Result<Container, StoreError> {
    // Put and delete a key so the document records at least one change.
    let mut doc = AutoCommit::new();
    doc.put(automerge::ROOT, "_", true)
        .map_err(|e| StoreError::Other(e.to_string()))?;
    doc.delete(automerge::ROOT, "_")
        .map_err(|e| StoreError::Other(e.to_string()))?;

    Ok(Container {
        magic: MAGIC.to_string(),
        format_version,
        key_check: key.map(|k| ByteBuf::from(k.fingerprint().to_vec())),
        payload: ByteBuf::from(doc.save()),
    })
}

fn read_container(path: &Path) -> Result<Container, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    ciborium::from_reader(bytes.as_slice()).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_container(path: &Path, container: &Container) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let mut bytes = Vec::new();
    ciborium::into_writer(container, &mut bytes).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, bytes).map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
pub(crate) fn write_store_with_version(
    path: &Path,
    format_version: u32,
    key: Option<&EncryptionKey>,
) {
    write_container(path, &new_container(format_version, key).unwrap()).unwrap();
}
