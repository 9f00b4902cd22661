use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;
use trolley_core::{ids::*, ItemChangeRequest, ItemChanges, ItemRecord, ListSnapshot};
use trolley_engine::{Caller, ListService};

use crate::api::ListApi;
use crate::error::ClientError;

/// In-process transport to a shared [`ListService`]. Snapshots are passed
/// through their MessagePack encoding, so the client never aliases server state.
#[derive(Clone)]
pub struct LocalTransport {
    service: Arc<Mutex<ListService>>,
    caller: Caller,
}

impl LocalTransport {
    pub fn new(service: Arc<Mutex<ListService>>, caller: Caller) -> Self {
        Self { service, caller }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }
}

#[async_trait]
impl ListApi for LocalTransport {
    async fn fetch_snapshot(&self, list_id: ListId) -> Result<ListSnapshot, ClientError> {
        let bytes = {
            let mut service = self.service.lock();
            service.snapshot(&self.caller, list_id)?.to_msgpack()?
        };
        trace!(list_id = %list_id, bytes = bytes.len(), "snapshot fetched");
        Ok(ListSnapshot::from_msgpack(&bytes)?)
    }

    async fn update_item(
        &self,
        item_id: ItemId,
        changes: ItemChanges,
        expected_version: u64,
    ) -> Result<ItemRecord, ClientError> {
        let mut service = self.service.lock();
        Ok(service.update_item(&self.caller, item_id, &changes, expected_version)?)
    }

    async fn update_items(
        &self,
        list_id: ListId,
        requests: Vec<ItemChangeRequest>,
    ) -> Result<Vec<ItemRecord>, ClientError> {
        let mut service = self.service.lock();
        Ok(service.update_items(&self.caller, list_id, &requests)?)
    }
}
