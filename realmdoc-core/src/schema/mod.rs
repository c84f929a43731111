//! Remote schema metadata and the capability that fetches it.

mod http;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::SyncUser;
use crate::location::SyncUrl;

pub use http::HttpSchemaLoader;

/// Data model of a sync store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub object_types: Vec<ObjectType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub optional: bool,
}

impl Schema {
    /// Checks names are present and unique.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut types = HashSet::new();
        for object_type in &self.object_types {
            if object_type.name.is_empty() {
                return Err(SchemaError::Invalid("object type without a name".to_string()));
            }
            if !types.insert(object_type.name.as_str()) {
                return Err(SchemaError::Invalid(format!(
                    "duplicate object type '{}'",
                    object_type.name
                )));
            }

            let mut properties = HashSet::new();
            for property in &object_type.properties {
                if property.name.is_empty() || property.kind.is_empty() {
                    return Err(SchemaError::Invalid(format!(
                        "incomplete property on '{}'",
                        object_type.name
                    )));
                }
                if !properties.insert(property.name.as_str()) {
                    return Err(SchemaError::Invalid(format!(
                        "duplicate property '{}.{}'",
                        object_type.name, property.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn object_type(&self, name: &str) -> Option<&ObjectType> {
        self.object_types.iter().find(|t| t.name == name)
    }
}

/// Fetches the schema of a sync store before it is opened.
#[async_trait]
pub trait SchemaLoader: Send + Sync {
    async fn load_schema(&self, sync_url: &SyncUrl, user: &SyncUser)
        -> Result<Schema, SchemaError>;
}

/// Errors loading a remote schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to reach schema server: {0}")]
    Transport(String),

    #[error("Schema server returned status {0}")]
    Status(u16),

    #[error("Invalid schema: {0}")]
    Invalid(String),

    #[error("Session expired before the schema could be loaded")]
    SessionExpired,
}
