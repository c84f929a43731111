//! Conventions the opener takes from its host configuration.

use std::time::Duration;

use crate::auth::ErrorTranslations;

/// File extension of local store files.
pub const DEFAULT_STORE_EXTENSION: &str = "realm";
/// URL scheme of sync stores reached over TLS.
pub const DEFAULT_SECURE_SCHEME: &str = "realms";
/// URL scheme of sync stores reached without TLS.
pub const DEFAULT_PLAIN_SCHEME: &str = "realm";
/// How long a scoped grant outlives the document that acquired it.
pub const DEFAULT_RELEASE_DELAY: Duration = Duration::from_secs(60);

/// Settings shared by every document opened through the same services.
#[derive(Debug, Clone)]
pub struct OpenerSettings {
    /// Extension (without the dot) a local store file must carry.
    pub store_extension: String,
    /// Secure sync scheme; maps to `https` for the auth server.
    pub secure_scheme: String,
    /// Plain sync scheme; maps to `http` for the auth server.
    pub plain_scheme: String,
    /// Delay between document teardown and release of its scoped grant.
    pub release_delay: Duration,
    /// Status code rewrites applied to authentication errors.
    pub translations: ErrorTranslations,
}

impl OpenerSettings {
    /// Returns true if `scheme` names a sync store.
    pub fn is_sync_scheme(&self, scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case(&self.secure_scheme)
            || scheme.eq_ignore_ascii_case(&self.plain_scheme)
    }

    /// Returns true if `scheme` is the secure sync scheme.
    pub fn is_secure_scheme(&self, scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case(&self.secure_scheme)
    }
}

impl Default for OpenerSettings {
    fn default() -> Self {
        Self {
            store_extension: DEFAULT_STORE_EXTENSION.to_string(),
            secure_scheme: DEFAULT_SECURE_SCHEME.to_string(),
            plain_scheme: DEFAULT_PLAIN_SCHEME.to_string(),
            release_delay: DEFAULT_RELEASE_DELAY,
            translations: ErrorTranslations::default(),
        }
    }
}
