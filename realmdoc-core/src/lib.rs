//! realmdoc Core Library
//!
//! Opens local and sync stores through a resumable state machine.
//! Callers classify a target with [`classify`], open it with
//! [`Document::open_local`] or [`Document::open_remote`], and branch on
//! [`Document::state`] to decide what to ask the user for next.

pub mod auth;
pub mod document;
pub mod error;
pub mod location;
pub mod sandbox;
pub mod schema;
pub mod services;
pub mod settings;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

pub use auth::{
    AuthError, Authenticator, Credential, ErrorTranslations, HttpAuthenticator, HttpSession,
    Session, SyncUser,
};
pub use document::Document;
pub use error::DocumentError;
pub use location::{classify, Classification, RejectReason, StoreLocation, SyncUrl};
pub use sandbox::{
    AccessPrompt, FsSandbox, Grant, GrantError, GrantStore, SandboxAccess, ScopedAccess,
    ScopedResourceHandle,
};
pub use schema::{HttpSchemaLoader, Schema, SchemaError, SchemaLoader};
pub use services::Services;
pub use settings::OpenerSettings;
pub use state::DocumentState;
pub use store::{EncryptionKey, FileStoreEngine, KeyError, Store, StoreEngine, StoreError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
