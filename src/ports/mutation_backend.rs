//! MutationBackend port - the REST collaborator for optimistic writes.
//!
//! The relational persistence layer and its REST surface are external to
//! this crate. The cache reconciler calls this port for create/update/delete
//! and expects either the canonical entity the server committed or a
//! structured error.

use async_trait::async_trait;

use crate::domain::{EntityKind, SyncError};

/// Port for issuing entity mutations against the REST layer.
#[async_trait]
pub trait MutationBackend: Send + Sync {
    /// Create an entity. Returns the canonical entity as committed.
    ///
    /// # Errors
    ///
    /// [`SyncError::Mutation`] when the server rejects the write,
    /// [`SyncError::Transport`] when the request cannot be delivered.
    async fn create(
        &self,
        kind: EntityKind,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, SyncError>;

    /// Update an entity. Returns the canonical entity as committed.
    async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, SyncError>;

    /// Delete an entity.
    async fn delete(&self, kind: EntityKind, id: i64) -> Result<(), SyncError>;
}
