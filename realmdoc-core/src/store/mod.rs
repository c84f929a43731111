//! Store engine capability.
//!
//! The opener never reads or writes store files itself. It asks a
//! [`StoreEngine`] for a [`Store`] bound to a location and then drives that
//! store through `requires_format_upgrade`, `set_encryption_key` and
//! `connect`. [`StoreError::AccessDenied`] is the one error kind the opener
//! treats specially: it means the store wants an encryption key.

mod file;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::auth::SyncUser;
use crate::location::SyncUrl;

pub use file::{FileStore, FileStoreEngine, CURRENT_FORMAT_VERSION};
#[cfg(test)]
pub(crate) use file::{lock_path, write_store_with_version};

/// Length in bytes of a store encryption key.
pub const ENCRYPTION_KEY_LEN: usize = 64;

/// Creates store handles for local files and sync URLs.
pub trait StoreEngine: Send + Sync {
    /// Returns a store bound to a local file. Nothing is opened yet.
    fn new_local(&self, path: &Path) -> Box<dyn Store>;

    /// Returns a store bound to a sync URL on behalf of `user`.
    fn new_remote(&self, sync_url: &SyncUrl, user: &SyncUser) -> Box<dyn Store>;
}

/// A store that has been located but not necessarily opened.
pub trait Store: Send + fmt::Debug {
    /// Returns true if the on-disk format is older than the engine's and
    /// connecting would migrate it.
    fn requires_format_upgrade(&self) -> bool;

    /// Sets the key used by the next `connect`.
    fn set_encryption_key(&mut self, key: EncryptionKey);

    /// Opens the store. Performs any pending format upgrade.
    fn connect(&mut self) -> Result<(), StoreError>;

    fn is_connected(&self) -> bool;
}

/// Errors reported by a store engine.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store refused access; an encryption key is missing or wrong.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("I/O error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Store {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Store format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Returns true for the access-denied / encryption-required signal.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, StoreError::AccessDenied(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A 64-byte store encryption key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; ENCRYPTION_KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let key: [u8; ENCRYPTION_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self(key))
    }

    /// Parses a key from 128 hex characters. Surrounding whitespace is ignored.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim()).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// SHA-256 digest of the key, used to check a key without storing it.
    pub fn fingerprint(&self) -> [u8; 32] {
        let digest = Sha256::digest(self.0);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Errors parsing an encryption key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("Invalid encryption key length: expected 64 bytes, got {0}")]
    InvalidLength(usize),
}
