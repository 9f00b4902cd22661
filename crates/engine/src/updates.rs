use std::collections::HashSet;

use tracing::{debug, instrument, warn};

use trolley_core::{
    ids::*, ItemChangeRequest, ItemChanges, ItemPatch, ItemRecord, ListStatus, Timestamp,
};
use trolley_storage::{CasOutcome, RecordReader, RecordWriter, StoreUnit};

use crate::access::Caller;
use crate::error::{EngineError, ItemValidationError};
use crate::ListService;

impl ListService {
    /// Apply one change set to one item, provided the caller still holds the
    /// item's current version. On success the stored record comes back with
    /// its version advanced by exactly one.
    #[instrument(level = "debug", skip(self, caller, changes), fields(item_id = %item_id))]
    pub fn update_item(
        &mut self,
        caller: &Caller,
        item_id: ItemId,
        changes: &ItemChanges,
        expected_version: u64,
    ) -> Result<ItemRecord, EngineError> {
        let item = self.require_item(caller, item_id)?;
        self.clock.observe(item.updated_at);
        let patch = changes
            .validate(self.config.max_quantity)
            .map_err(EngineError::Validation)?;
        let now = self.clock.tick()?;

        let mut work = self.store.unit()?;
        match apply_patch(&mut work, item_id, &patch, expected_version, now)? {
            CasOutcome::Applied(item) => {
                work.commit()?;
                debug!(version = item.version, "item updated");
                Ok(item)
            }
            CasOutcome::Stale { current_version } => {
                work.discard()?;
                warn!(
                    expected = expected_version,
                    current = current_version,
                    "stale item update rejected"
                );
                Err(EngineError::ItemConflict {
                    item_id,
                    expected: expected_version,
                    current: current_version,
                })
            }
            CasOutcome::Missing => {
                work.discard()?;
                Err(EngineError::ItemNotFound(item_id.to_string()))
            }
        }
    }

    /// Apply several item changes of one list as a single unit of work.
    ///
    /// Either every tuple lands or none does. A stale version aborts the
    /// batch at once with [`EngineError::BatchConflict`]; invalid change sets
    /// are collected across the whole batch and reported together as
    /// [`EngineError::BatchInvalid`].
    #[instrument(level = "debug", skip(self, caller, requests), fields(list_id = %list_id, size = requests.len()))]
    pub fn update_items(
        &mut self,
        caller: &Caller,
        list_id: ListId,
        requests: &[ItemChangeRequest],
    ) -> Result<Vec<ItemRecord>, EngineError> {
        self.require_list(caller, list_id)?;
        if requests.len() > self.config.max_batch_size {
            return Err(EngineError::invalid(
                "items",
                format!(
                    "a batch may hold at most {} items",
                    self.config.max_batch_size
                ),
            ));
        }
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let mut members = HashSet::new();
        for item in self.store.get_items(list_id)? {
            self.clock.observe(item.updated_at);
            members.insert(item.item_id);
        }
        if let Some(stray) = requests.iter().find(|r| !members.contains(&r.item_id)) {
            return Err(EngineError::ItemNotFound(stray.item_id.to_string()));
        }

        let max_quantity = self.config.max_quantity;
        let now = self.clock.tick()?;
        let mut work = self.store.unit()?;
        let mut updated = Vec::with_capacity(requests.len());
        let mut invalid = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            let patch = match request.changes.validate(max_quantity) {
                Ok(patch) => patch,
                Err(errors) => {
                    invalid.push(ItemValidationError {
                        index,
                        item_id: request.item_id,
                        errors,
                    });
                    continue;
                }
            };
            match apply_patch(&mut work, request.item_id, &patch, request.expected_version, now)? {
                CasOutcome::Applied(item) => updated.push(item),
                CasOutcome::Stale { current_version } => {
                    work.discard()?;
                    warn!(
                        index,
                        item_id = %request.item_id,
                        expected = request.expected_version,
                        current = current_version,
                        "batch aborted on stale version"
                    );
                    return Err(EngineError::BatchConflict);
                }
                CasOutcome::Missing => {
                    work.discard()?;
                    return Err(EngineError::ItemNotFound(request.item_id.to_string()));
                }
            }
        }

        if !invalid.is_empty() {
            work.discard()?;
            debug!(failed = invalid.len(), "batch rejected");
            return Err(EngineError::BatchInvalid { errors: invalid });
        }

        work.commit()?;
        debug!(updated = updated.len(), "batch applied");
        Ok(updated)
    }
}

/// The change routine shared by single and batch updates. Reads the item
/// inside the unit, writes it under compare-and-swap, and moves a pending
/// list to in_progress when an item gets checked.
fn apply_patch(
    work: &mut StoreUnit<'_>,
    item_id: ItemId,
    patch: &ItemPatch,
    expected_version: u64,
    now: Timestamp,
) -> Result<CasOutcome<ItemRecord>, EngineError> {
    let Some(current) = work.get_item(item_id)? else {
        return Ok(CasOutcome::Missing);
    };
    let next = patch.apply(&current, now);
    let outcome = work.cas_item(&next, expected_version)?;
    if outcome.is_applied() && patch.checks_item(&current) {
        start_shopping(work, current.list_id, now)?;
    }
    Ok(outcome)
}

fn start_shopping(
    work: &mut StoreUnit<'_>,
    list_id: ListId,
    now: Timestamp,
) -> Result<(), EngineError> {
    let Some(list) = work.get_list(list_id)? else {
        return Ok(());
    };
    if list.status != ListStatus::Pending {
        return Ok(());
    }
    let mut next = list.clone();
    next.status = ListStatus::InProgress;
    next.updated_at = now;
    if let CasOutcome::Applied(stored) = work.cas_list(&next, list.version)? {
        debug!(list_id = %list_id, version = stored.version, "list started");
    }
    Ok(())
}
