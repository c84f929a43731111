//! Schema loading over HTTP.
//!
//! `GET {auth_server}/schema?path=<sync path>` with the session's bearer
//! token, where the auth server is derived from the sync URL.

use async_trait::async_trait;

use super::{Schema, SchemaError, SchemaLoader};
use crate::auth::{endpoint, SyncUser};
use crate::location::SyncUrl;

#[derive(Debug, Clone, Default)]
pub struct HttpSchemaLoader {
    client: reqwest::Client,
}

impl HttpSchemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SchemaLoader for HttpSchemaLoader {
    async fn load_schema(
        &self,
        sync_url: &SyncUrl,
        user: &SyncUser,
    ) -> Result<Schema, SchemaError> {
        if !user.is_valid() {
            return Err(SchemaError::SessionExpired);
        }

        let response = self
            .client
            .get(endpoint(sync_url.derived_auth_server(), "schema"))
            .query(&[("path", sync_url.path())])
            .bearer_auth(user.access_token())
            .send()
            .await
            .map_err(|e| SchemaError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SchemaError::Status(response.status().as_u16()));
        }

        let schema: Schema = response
            .json()
            .await
            .map_err(|e| SchemaError::Invalid(e.to_string()))?;
        schema.validate()?;

        tracing::debug!(
            sync_url = %sync_url,
            object_types = schema.object_types.len(),
            "loaded schema"
        );
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use crate::settings::OpenerSettings;
    use crate::testing::FakeSession;

    async fn schema(
        Query(params): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer tok-alice") {
            return (StatusCode::UNAUTHORIZED, Json(json!({})));
        }
        match params.get("path").map(String::as_str) {
            Some("/tasks") => (
                StatusCode::OK,
                Json(json!({"object_types": [
                    {"name": "Task", "properties": [{"name": "title", "type": "string"}]}
                ]})),
            ),
            Some("/broken") => (
                StatusCode::OK,
                Json(json!({"object_types": [{"name": "A"}, {"name": "A"}]})),
            ),
            _ => (StatusCode::NOT_FOUND, Json(json!({}))),
        }
    }

    async fn start_server() -> String {
        let app = Router::new().route("/schema", get(schema));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("realm://{}", addr)
    }

    fn sync_url(base: &str, path: &str) -> SyncUrl {
        SyncUrl::parse(&format!("{}{}", base, path), &OpenerSettings::default()).unwrap()
    }

    fn alice() -> SyncUser {
        Arc::new(FakeSession::with_token("alice", "tok-alice"))
    }

    #[tokio::test]
    async fn test_load_schema() {
        let base = start_server().await;
        let schema = HttpSchemaLoader::new()
            .load_schema(&sync_url(&base, "/tasks"), &alice())
            .await
            .unwrap();
        assert!(schema.object_type("Task").is_some());
    }

    #[tokio::test]
    async fn test_unknown_path_is_status_error() {
        let base = start_server().await;
        let err = HttpSchemaLoader::new()
            .load_schema(&sync_url(&base, "/missing"), &alice())
            .await
            .unwrap_err();
        assert_eq!(err, SchemaError::Status(404));
    }

    #[tokio::test]
    async fn test_wrong_token_is_status_error() {
        let base = start_server().await;
        let bob: SyncUser = Arc::new(FakeSession::with_token("bob", "tok-bob"));
        let err = HttpSchemaLoader::new()
            .load_schema(&sync_url(&base, "/tasks"), &bob)
            .await
            .unwrap_err();
        assert_eq!(err, SchemaError::Status(401));
    }

    #[tokio::test]
    async fn test_invalid_schema_rejected() {
        let base = start_server().await;
        let err = HttpSchemaLoader::new()
            .load_schema(&sync_url(&base, "/broken"), &alice())
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_expired_session_skips_request() {
        let user = alice();
        user.log_out();
        let err = HttpSchemaLoader::new()
            .load_schema(&sync_url("realm://127.0.0.1:9", "/tasks"), &user)
            .await
            .unwrap_err();
        assert_eq!(err, SchemaError::SessionExpired);
    }
}
