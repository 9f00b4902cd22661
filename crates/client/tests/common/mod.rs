#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use trolley_client::{ClientError, ListApi};
use trolley_core::{
    ids::*, ItemChangeRequest, ItemChanges, ItemRecord, ListRecord, ListSnapshot, ListStatus,
    Quantity, Timestamp, Unit,
};

/// Scripted list service. While `gated` is set every fetch waits for a
/// permit from `gate`, so a test can hold refreshes in flight. Updates can be
/// made to hang forever.
pub struct FakeApi {
    pub snapshot: Mutex<ListSnapshot>,
    pub gated: AtomicBool,
    pub gate: Semaphore,
    pub fetches_started: AtomicUsize,
    pub fetches_done: AtomicUsize,
    pub hang_updates: AtomicBool,
}

impl FakeApi {
    pub fn new(items: usize) -> Arc<Self> {
        let now = Timestamp::from_millis(1_000);
        let list = ListRecord {
            list_id: ListId::new(),
            owner_id: OwnerId::new(),
            recipe_id: None,
            status: ListStatus::Pending,
            title: "Scripted".into(),
            note: String::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let items = (0..items as u32)
            .map(|position| ItemRecord {
                item_id: ItemId::new(),
                list_id: list.list_id,
                ingredient_id: IngredientId::new(),
                quantity: Quantity::new(1.0, Quantity::DEFAULT_MAX).unwrap(),
                unit: Unit::Piece,
                checked: false,
                checked_at: None,
                version: 0,
                position,
                created_at: now,
                updated_at: now,
            })
            .collect();
        Arc::new(Self {
            snapshot: Mutex::new(ListSnapshot::new(list, items)),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            fetches_started: AtomicUsize::new(0),
            fetches_done: AtomicUsize::new(0),
            hang_updates: AtomicBool::new(false),
        })
    }

    pub fn list_id(&self) -> ListId {
        self.snapshot.lock().list.list_id
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        self.snapshot.lock().items.iter().map(|i| i.item_id).collect()
    }

    /// Make subsequent fetches wait until `release` is called.
    pub fn close_gate(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, fetches: usize) {
        self.gate.add_permits(fetches);
    }

    pub fn started(&self) -> usize {
        self.fetches_started.load(Ordering::SeqCst)
    }

    pub fn done(&self) -> usize {
        self.fetches_done.load(Ordering::SeqCst)
    }

    /// Server-side edit made by someone else: bumps the item's version.
    pub fn remote_check(&self, item_id: ItemId) {
        let mut snapshot = self.snapshot.lock();
        let items: Vec<ItemRecord> = snapshot
            .items
            .iter()
            .map(|i| {
                let mut next = i.clone();
                if next.item_id == item_id {
                    next.checked = true;
                    next.version += 1;
                    next.updated_at = Timestamp::from_millis(next.updated_at.wall_ms() + 1);
                }
                next
            })
            .collect();
        *snapshot = ListSnapshot::new(snapshot.list.clone(), items);
    }
}

#[async_trait]
impl ListApi for FakeApi {
    async fn fetch_snapshot(&self, _list_id: ListId) -> Result<ListSnapshot, ClientError> {
        self.fetches_started.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            self.gate
                .acquire()
                .await
                .map_err(|e| ClientError::Internal(e.to_string()))?
                .forget();
        }
        self.fetches_done.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot.lock().clone())
    }

    async fn update_item(
        &self,
        item_id: ItemId,
        changes: ItemChanges,
        expected_version: u64,
    ) -> Result<ItemRecord, ClientError> {
        if self.hang_updates.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let snapshot = self.snapshot.lock();
        let item = snapshot
            .item(item_id)
            .ok_or_else(|| ClientError::NotFound(item_id.to_string()))?;
        if item.version != expected_version {
            return Err(ClientError::Conflict(format!(
                "expected {expected_version}, current {}",
                item.version
            )));
        }
        let mut next = item.clone();
        if let Some(checked) = changes.checked {
            next.checked = checked;
        }
        next.version += 1;
        Ok(next)
    }

    async fn update_items(
        &self,
        _list_id: ListId,
        _requests: Vec<ItemChangeRequest>,
    ) -> Result<Vec<ItemRecord>, ClientError> {
        Err(ClientError::Internal("batches are not scripted".into()))
    }
}

/// Let spawned tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
