//! REST mutation backend.
//!
//! Thin HTTP client over the persistence layer's REST surface. The
//! reconciler owns the optimistic-update logic; this adapter only issues
//! requests and maps failures onto the error taxonomy.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::domain::{EntityKind, SyncError};
use crate::ports::MutationBackend;

/// HTTP-backed [`MutationBackend`].
#[derive(Debug, Clone)]
pub struct RestMutationBackend {
    client: reqwest::Client,
    base_url: String,
}

impl RestMutationBackend {
    /// `base_url` is the API root, e.g. `http://localhost:8000/api/v1`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    fn collection_path(kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Inventory => "inventory",
            EntityKind::Price => "prices",
            EntityKind::Alert => "alerts",
        }
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/{}", self.base_url, Self::collection_path(kind))
    }

    fn entity_url(&self, kind: EntityKind, id: i64) -> String {
        format!("{}/{}/{}", self.base_url, Self::collection_path(kind), id)
    }

    /// Map a response to the canonical entity body or a mutation error.
    async fn read_entity(response: reqwest::Response) -> Result<serde_json::Value, SyncError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| SyncError::Protocol(e.to_string()));
        }
        Err(Self::rejection(status, response).await)
    }

    async fn rejection(status: StatusCode, response: reqwest::Response) -> SyncError {
        let message = response.text().await.unwrap_or_default();
        SyncError::mutation(status.as_u16(), message)
    }
}

#[async_trait]
impl MutationBackend for RestMutationBackend {
    async fn create(
        &self,
        kind: EntityKind,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, SyncError> {
        let response = self
            .client
            .post(self.collection_url(kind))
            .json(&value)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Self::read_entity(response).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, SyncError> {
        let response = self
            .client
            .put(self.entity_url(kind, id))
            .json(&value)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Self::read_entity(response).await
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> Result<(), SyncError> {
        let response = self
            .client
            .delete(self.entity_url(kind, id))
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(Self::rejection(status, response).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> RestMutationBackend {
        RestMutationBackend::new(reqwest::Client::new(), base)
    }

    #[test]
    fn urls_are_built_from_kind_and_id() {
        let backend = backend("http://localhost:8000/api/v1");
        assert_eq!(
            backend.collection_url(EntityKind::Inventory),
            "http://localhost:8000/api/v1/inventory"
        );
        assert_eq!(
            backend.entity_url(EntityKind::Price, 42),
            "http://localhost:8000/api/v1/prices/42"
        );
    }

    #[test]
    fn trailing_slashes_are_normalized() {
        let backend = backend("http://localhost:8000/api/v1///");
        assert_eq!(
            backend.collection_url(EntityKind::Alert),
            "http://localhost:8000/api/v1/alerts"
        );
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_transport_error() {
        // Nothing listens on this port.
        let backend = backend("http://127.0.0.1:1/api/v1");
        let err = backend
            .update(EntityKind::Inventory, 42, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }
}
