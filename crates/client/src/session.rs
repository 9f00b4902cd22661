use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument, warn};
use trolley_core::{
    ids::*, ItemChangeRequest, ItemChanges, ItemRecord, ListAggregate, ListRecord,
};

use crate::api::ListApi;
use crate::cache::{LocalCache, MergeReport};
use crate::config::ClientConfig;
use crate::error::ClientError;

/// One client's view of one list. Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct ListSession {
    list_id: ListId,
    api: Arc<dyn ListApi>,
    cache: Arc<Mutex<LocalCache>>,
    config: ClientConfig,
}

impl ListSession {
    /// Fetch the list once and start from that snapshot.
    pub async fn open(
        api: Arc<dyn ListApi>,
        list_id: ListId,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let session = Self {
            list_id,
            api,
            cache: Arc::new(Mutex::new(LocalCache::new())),
            config,
        };
        session.refresh().await?;
        Ok(session)
    }

    pub fn list_id(&self) -> ListId {
        self.list_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn list(&self) -> Option<ListRecord> {
        self.cache.lock().list().cloned()
    }

    pub fn items(&self) -> Vec<ItemRecord> {
        self.cache.lock().items().to_vec()
    }

    pub fn item(&self, item_id: ItemId) -> Option<ItemRecord> {
        self.cache.lock().item(item_id).cloned()
    }

    pub fn aggregate(&self) -> ListAggregate {
        self.cache.lock().aggregate()
    }

    pub fn is_editing(&self, item_id: ItemId) -> bool {
        self.cache.lock().is_editing(item_id)
    }

    pub async fn set_checked(
        &self,
        item_id: ItemId,
        checked: bool,
    ) -> Result<ItemRecord, ClientError> {
        self.update_item(item_id, ItemChanges::checked(checked)).await
    }

    /// Apply a change optimistically, send it with the last confirmed
    /// version, and settle the cache on the response.
    #[instrument(level = "debug", skip(self, changes), fields(item_id = %item_id))]
    pub async fn update_item(
        &self,
        item_id: ItemId,
        changes: ItemChanges,
    ) -> Result<ItemRecord, ClientError> {
        // the server enforces its own quantity bound
        let patch = changes
            .validate(f64::MAX)
            .map_err(ClientError::Validation)?;
        let expected = self
            .cache
            .lock()
            .begin_edit(item_id, &patch)
            .ok_or(ClientError::UnknownItem(item_id))?;

        let outcome = self
            .bounded(self.api.update_item(item_id, changes, expected))
            .await;
        match outcome {
            Ok(record) => {
                self.cache.lock().confirm(record.clone());
                debug!(version = record.version, "edit confirmed");
                Ok(record)
            }
            Err(err) => {
                self.cache.lock().fail(item_id);
                warn!(error = %err, "edit rejected");
                Err(err)
            }
        }
    }

    /// Check every unchecked item not already being edited, in one batch.
    pub async fn check_all(&self) -> Result<Vec<ItemRecord>, ClientError> {
        let changes = ItemChanges::checked(true);
        let patch = changes
            .validate(f64::MAX)
            .map_err(ClientError::Validation)?;
        let requests: Vec<ItemChangeRequest> = {
            let mut cache = self.cache.lock();
            let targets: Vec<ItemId> = cache
                .items()
                .iter()
                .filter(|i| !i.checked && !cache.is_editing(i.item_id))
                .map(|i| i.item_id)
                .collect();
            targets
                .into_iter()
                .filter_map(|item_id| {
                    cache
                        .begin_edit(item_id, &patch)
                        .map(|expected_version| ItemChangeRequest {
                            item_id,
                            changes: changes.clone(),
                            expected_version,
                        })
                })
                .collect()
        };
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ItemId> = requests.iter().map(|r| r.item_id).collect();
        let outcome = self
            .bounded(self.api.update_items(self.list_id, requests))
            .await;
        let mut cache = self.cache.lock();
        match outcome {
            Ok(records) => {
                for record in &records {
                    cache.confirm(record.clone());
                }
                debug!(count = records.len(), "batch confirmed");
                Ok(records)
            }
            Err(err) => {
                for item_id in ids {
                    cache.fail(item_id);
                }
                warn!(error = %err, "batch rejected");
                Err(err)
            }
        }
    }

    /// Fetch the list and reconcile it into the cache.
    pub async fn refresh(&self) -> Result<MergeReport, ClientError> {
        let snapshot = self.bounded(self.api.fetch_snapshot(self.list_id)).await?;
        let report = self.cache.lock().merge_snapshot(&snapshot)?;
        Ok(report)
    }

    /// User-requested refresh: drop every editing marker, then refresh.
    pub async fn manual_refresh(&self) -> Result<MergeReport, ClientError> {
        self.cache.lock().clear_editing();
        self.refresh().await
    }

    async fn bounded<T>(
        &self,
        request: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        let limit = self.config.request_timeout;
        tokio::time::timeout(limit, request)
            .await
            .map_err(|_| ClientError::Timeout(limit))?
    }
}
