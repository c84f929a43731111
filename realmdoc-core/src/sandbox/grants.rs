//! Persisted directory grants and the filesystem sandbox built on them.
//!
//! Grants live in a JSON file (normally `<data_dir>/grants.json`) so that a
//! directory approved once stays approved on later runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{SandboxAccess, ScopedAccess};

/// Filename for the grants file.
const GRANTS_FILE: &str = "grants.json";

/// A persisted approval to use one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: Uuid,
    pub directory: PathBuf,
    pub granted_at: DateTime<Utc>,
}

impl Grant {
    /// Returns true if this grant covers `directory` or one of its ancestors.
    ///
    /// Only absolute paths are compared; a relative path names a different
    /// directory depending on where the process runs.
    pub fn covers(&self, directory: &Path) -> bool {
        self.directory.is_absolute() && directory.starts_with(&self.directory)
    }
}

/// Resolves `directory` to the absolute path grants are keyed on.
///
/// Existing directories are canonicalized; others are made absolute against
/// the current directory.
fn resolve(directory: &Path) -> io::Result<PathBuf> {
    fs::canonicalize(directory).or_else(|_| std::path::absolute(directory))
}

/// JSON-backed list of grants.
#[derive(Debug, Clone)]
pub struct GrantStore {
    path: PathBuf,
}

impl GrantStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Grant store at the standard location inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(GRANTS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists all grants. A missing file means no grants.
    pub fn list(&self) -> Result<Vec<Grant>, GrantError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| GrantError::ParseError(self.path.clone(), e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(GrantError::IoError(self.path.clone(), e)),
        }
    }

    /// Finds a grant covering `directory`.
    pub fn find(&self, directory: &Path) -> Result<Option<Grant>, GrantError> {
        let directory =
            resolve(directory).map_err(|e| GrantError::IoError(directory.to_path_buf(), e))?;
        Ok(self.list()?.into_iter().find(|g| g.covers(&directory)))
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<Grant>, GrantError> {
        Ok(self.list()?.into_iter().find(|g| &g.id == id))
    }

    /// Adds a grant for `directory`, or returns the one already covering it.
    ///
    /// The grant is stored under the resolved absolute path.
    pub fn add(&self, directory: &Path) -> Result<Grant, GrantError> {
        let directory =
            resolve(directory).map_err(|e| GrantError::IoError(directory.to_path_buf(), e))?;
        let mut grants = self.list()?;
        if let Some(existing) = grants.iter().find(|g| g.covers(&directory)) {
            return Ok(existing.clone());
        }

        let grant = Grant {
            id: Uuid::new_v4(),
            directory,
            granted_at: Utc::now(),
        };
        grants.push(grant.clone());
        self.save(&grants)?;

        Ok(grant)
    }

    /// Removes a grant.
    ///
    /// Returns `Ok(true)` if it existed, `Ok(false)` otherwise.
    pub fn revoke(&self, id: &Uuid) -> Result<bool, GrantError> {
        let mut grants = self.list()?;
        let before = grants.len();
        grants.retain(|g| &g.id != id);
        if grants.len() == before {
            return Ok(false);
        }
        self.save(&grants)?;
        Ok(true)
    }

    fn save(&self, grants: &[Grant]) -> Result<(), GrantError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| GrantError::IoError(parent.to_path_buf(), e))?;
        }
        let json = serde_json::to_string_pretty(grants)
            .map_err(|e| GrantError::ParseError(self.path.clone(), e))?;
        fs::write(&self.path, json).map_err(|e| GrantError::IoError(self.path.clone(), e))
    }
}

/// Errors reading or writing the grants file.
#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    #[error("I/O error for {}: {1}", .0.display())]
    IoError(PathBuf, #[source] io::Error),

    #[error("Failed to parse grants file {}: {1}", .0.display())]
    ParseError(PathBuf, #[source] serde_json::Error),
}

/// Asks the user whether a directory may be used.
pub trait AccessPrompt: Send + Sync {
    fn confirm(&self, directory: &Path) -> bool;
}

impl<F> AccessPrompt for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn confirm(&self, directory: &Path) -> bool {
        self(directory)
    }
}

/// Sandbox over the local filesystem.
///
/// When enabled, only writable directories under `allowed_roots` are usable
/// without a grant. Grants are requested through an [`AccessPrompt`] and
/// persisted in a [`GrantStore`].
pub struct FsSandbox {
    enabled: bool,
    allowed_roots: Vec<PathBuf>,
    grants: GrantStore,
    prompt: Box<dyn AccessPrompt>,
}

impl FsSandbox {
    pub fn new(grants: GrantStore, prompt: impl AccessPrompt + 'static) -> Self {
        Self {
            enabled: true,
            allowed_roots: Vec::new(),
            grants,
            prompt: Box::new(prompt),
        }
    }

    /// A sandbox that treats every writable directory as accessible.
    pub fn disabled(grants: GrantStore) -> Self {
        Self {
            enabled: false,
            ..Self::new(grants, |_: &Path| false)
        }
    }

    pub fn with_allowed_roots(mut self, roots: impl IntoIterator<Item = PathBuf>) -> Self {
        self.allowed_roots
            .extend(roots.into_iter().map(|root| resolve(&root).unwrap_or(root)));
        self
    }

    pub fn grants(&self) -> &GrantStore {
        &self.grants
    }
}

impl SandboxAccess for FsSandbox {
    fn is_accessible(&self, directory: &Path) -> bool {
        let Ok(directory) = resolve(directory) else {
            return false;
        };
        let writable = fs::metadata(&directory)
            .map(|m| m.is_dir() && !m.permissions().readonly())
            .unwrap_or(false);
        if !writable {
            return false;
        }
        !self.enabled || self.allowed_roots.iter().any(|root| directory.starts_with(root))
    }

    fn request_access(&self, directory: &Path) -> Option<Box<dyn ScopedAccess>> {
        let directory = match resolve(directory) {
            Ok(directory) => directory,
            Err(e) => {
                tracing::warn!(directory = %directory.display(), "Failed to resolve directory: {}", e);
                return None;
            }
        };
        let grant = match self.grants.find(&directory) {
            Ok(Some(grant)) => grant,
            Ok(None) => {
                if !self.prompt.confirm(&directory) {
                    tracing::info!(directory = %directory.display(), "access denied by user");
                    return None;
                }
                match self.grants.add(&directory) {
                    Ok(grant) => grant,
                    Err(e) => {
                        tracing::warn!("Failed to persist access grant: {}", e);
                        return None;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read access grants: {}", e);
                return None;
            }
        };

        Some(Box::new(PersistedAccess {
            directory,
            grant,
            grants: self.grants.clone(),
        }))
    }
}

/// Scoped access backed by a persisted grant.
#[derive(Debug)]
struct PersistedAccess {
    directory: PathBuf,
    grant: Grant,
    grants: GrantStore,
}

impl ScopedAccess for PersistedAccess {
    fn directory(&self) -> &Path {
        &self.directory
    }

    fn start_accessing(&self) -> bool {
        // The grant may have been revoked since it was handed out.
        matches!(self.grants.get(&self.grant.id), Ok(Some(_)))
    }

    fn stop_accessing(&self) {
        tracing::debug!(grant = %self.grant.id, "scoped access stopped");
    }
}
