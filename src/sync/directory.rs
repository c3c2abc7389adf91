use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::models::{ClientListResponse, CurrentUser, Snapshot, Watermark};

use super::SyncError;

/// Change-feed subscription. Dropping the stream tears the subscription down.
pub type SnapshotStream = BoxStream<'static, Result<Snapshot, SyncError>>;

/// Backend the roster sync client talks to.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Identity of the coach the directory is authenticated as.
    async fn current_user(&self) -> Result<CurrentUser, SyncError>;

    /// One-shot listing of all of the coach's clients.
    async fn list_clients(&self, coach: &CurrentUser) -> Result<ClientListResponse, SyncError>;

    async fn delete_client(&self, coach: &CurrentUser, client_id: &str) -> Result<(), SyncError>;

    /// Open a change feed of the coach's clients past `watermark`.
    async fn subscribe(
        &self,
        coach: &CurrentUser,
        watermark: Watermark,
    ) -> Result<SnapshotStream, SyncError>;
}
