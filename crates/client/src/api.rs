use async_trait::async_trait;
use trolley_core::{ids::*, ItemChangeRequest, ItemChanges, ItemRecord, ListSnapshot};

use crate::error::ClientError;

/// The three calls a client makes against the list service. Implementations
/// carry the caller's identity themselves.
#[async_trait]
pub trait ListApi: Send + Sync {
    async fn fetch_snapshot(&self, list_id: ListId) -> Result<ListSnapshot, ClientError>;

    async fn update_item(
        &self,
        item_id: ItemId,
        changes: ItemChanges,
        expected_version: u64,
    ) -> Result<ItemRecord, ClientError>;

    async fn update_items(
        &self,
        list_id: ListId,
        requests: Vec<ItemChangeRequest>,
    ) -> Result<Vec<ItemRecord>, ClientError>;
}
