//! The set of capabilities a document is opened with.

use std::fmt;
use std::sync::Arc;

use crate::auth::Authenticator;
use crate::sandbox::SandboxAccess;
use crate::schema::SchemaLoader;
use crate::settings::OpenerSettings;
use crate::store::StoreEngine;

/// Capabilities and conventions shared by every document a caller opens.
#[derive(Clone)]
pub struct Services {
    pub sandbox: Arc<dyn SandboxAccess>,
    pub engine: Arc<dyn StoreEngine>,
    pub authenticator: Arc<dyn Authenticator>,
    pub schema_loader: Arc<dyn SchemaLoader>,
    pub settings: Arc<OpenerSettings>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
