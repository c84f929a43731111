//! Scoped access to directories outside the sandbox boundary.
//!
//! A [`SandboxAccess`] decides whether a directory is usable as-is and, if
//! not, hands out a persisted [`ScopedAccess`] grant. The opener activates a
//! grant by wrapping it in a [`ScopedResourceHandle`].
//!
//! # Release ordering
//!
//! A handle is reference counted. The document keeps one clone and the
//! store it presents keeps another, so the grant is stopped only after
//! both are gone. On teardown the document gives its clone to
//! [`ScopedResourceHandle::release_after`], which holds it for a fixed
//! delay on the current runtime. The grant is therefore revoked only once
//! the delay has elapsed *and* the store has finished dropping, whichever
//! comes last.

mod grants;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use grants::{AccessPrompt, FsSandbox, Grant, GrantError, GrantStore};

/// Decides directory accessibility and hands out scoped grants.
pub trait SandboxAccess: Send + Sync {
    /// Returns true if `directory` can be written without a grant.
    fn is_accessible(&self, directory: &Path) -> bool;

    /// Requests a grant for `directory`. May block on a user prompt.
    ///
    /// Returns `None` if access was denied or cannot be granted.
    fn request_access(&self, directory: &Path) -> Option<Box<dyn ScopedAccess>>;
}

/// A grant for one directory that must be started before use and stopped
/// when no longer needed.
pub trait ScopedAccess: Send + Sync + fmt::Debug {
    fn directory(&self) -> &Path;

    /// Begins using the grant. Returns false if it is no longer valid.
    fn start_accessing(&self) -> bool;

    fn stop_accessing(&self);
}

/// An activated grant, shared between a document and its store.
#[derive(Debug, Clone)]
pub struct ScopedResourceHandle {
    inner: Arc<ActiveGrant>,
}

#[derive(Debug)]
struct ActiveGrant {
    access: Box<dyn ScopedAccess>,
}

impl Drop for ActiveGrant {
    fn drop(&mut self) {
        tracing::debug!(
            directory = %self.access.directory().display(),
            "stopping scoped access"
        );
        self.access.stop_accessing();
    }
}

impl ScopedResourceHandle {
    /// Starts `access`. Returns `None` if the grant refused to start.
    pub fn activate(access: Box<dyn ScopedAccess>) -> Option<Self> {
        if !access.start_accessing() {
            tracing::warn!(
                directory = %access.directory().display(),
                "scoped access grant could not be started"
            );
            return None;
        }
        Some(Self {
            inner: Arc::new(ActiveGrant { access }),
        })
    }

    pub fn directory(&self) -> &Path {
        self.inner.access.directory()
    }

    /// Number of live holders of this grant.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Gives up this holder after `delay`.
    ///
    /// The wait runs on the current tokio runtime. Without one, the holder
    /// is dropped immediately and the remaining holders decide when the
    /// grant stops.
    pub fn release_after(self, delay: Duration) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!(
                    directory = %self.directory().display(),
                    delay_secs = delay.as_secs(),
                    "scheduling scoped access release"
                );
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    drop(self);
                });
            }
            Err(_) => {
                tracing::debug!(
                    directory = %self.directory().display(),
                    "no runtime to defer release; releasing with the store"
                );
                drop(self);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAccess;

    #[test]
    fn test_activate_starts_access() {
        let (access, counters) = FakeAccess::new("/data");
        let handle = ScopedResourceHandle::activate(Box::new(access)).unwrap();
        assert_eq!(counters.started(), 1);
        assert_eq!(counters.stopped(), 0);
        assert_eq!(handle.directory(), Path::new("/data"));
    }

    #[test]
    fn test_activate_fails_for_stale_grant() {
        let (access, counters) = FakeAccess::refusing("/data");
        assert!(ScopedResourceHandle::activate(Box::new(access)).is_none());
        // A grant that never started is never stopped.
        assert_eq!(counters.stopped(), 0);
    }

    #[test]
    fn test_stops_after_last_holder() {
        let (access, counters) = FakeAccess::new("/data");
        let handle = ScopedResourceHandle::activate(Box::new(access)).unwrap();
        let store_token = handle.clone();
        assert_eq!(handle.holders(), 2);

        drop(handle);
        assert_eq!(counters.stopped(), 0);
        drop(store_token);
        assert_eq!(counters.stopped(), 1);
    }

    #[test]
    fn test_release_without_runtime_is_immediate() {
        let (access, counters) = FakeAccess::new("/data");
        let handle = ScopedResourceHandle::activate(Box::new(access)).unwrap();
        handle.release_after(Duration::from_secs(60));
        assert_eq!(counters.stopped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_deferred_on_runtime() {
        let (access, counters) = FakeAccess::new("/data");
        let handle = ScopedResourceHandle::activate(Box::new(access)).unwrap();
        handle.release_after(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(counters.stopped(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(counters.stopped(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_waits_for_store_holder() {
        let (access, counters) = FakeAccess::new("/data");
        let handle = ScopedResourceHandle::activate(Box::new(access)).unwrap();
        let store_token = handle.clone();
        handle.release_after(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(counters.stopped(), 0);

        drop(store_token);
        assert_eq!(counters.stopped(), 1);
    }
}
