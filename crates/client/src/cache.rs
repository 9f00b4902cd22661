use std::collections::{HashMap, HashSet};

use tracing::trace;
use trolley_core::{
    ids::*, CoreError, ItemPatch, ItemRecord, ListAggregate, ListRecord, ListSnapshot,
    SnapshotFingerprint,
};

/// An item with requests outstanding.
#[derive(Debug, Clone)]
struct EditState {
    in_flight: u32,
    /// Latest server state known for the item; restored when the edit fails.
    confirmed: ItemRecord,
}

/// What a merge did to the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// The snapshot was identical to the last merged one and was not applied.
    pub skipped: bool,
    pub adopted: usize,
    pub kept: usize,
    pub added: usize,
    pub removed: usize,
    pub list_adopted: bool,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.adopted + self.added + self.removed > 0 || self.list_adopted
    }
}

/// Client copy of one list. Items the user is editing are marked here and
/// shielded from polled state until their last request resolves.
#[derive(Debug, Default)]
pub struct LocalCache {
    list: Option<ListRecord>,
    items: Vec<ItemRecord>,
    editing: HashMap<ItemId, EditState>,
    /// Items carried by the last merged snapshot.
    on_server: HashSet<ItemId>,
    last_fingerprint: Option<SnapshotFingerprint>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Option<&ListRecord> {
        self.list.as_ref()
    }

    pub fn items(&self) -> &[ItemRecord] {
        &self.items
    }

    pub fn item(&self, item_id: ItemId) -> Option<&ItemRecord> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn aggregate(&self) -> ListAggregate {
        ListAggregate::compute(&self.items)
    }

    pub fn is_editing(&self, item_id: ItemId) -> bool {
        self.editing.contains_key(&item_id)
    }

    pub fn editing_count(&self) -> usize {
        self.editing.len()
    }

    /// Apply `patch` optimistically and mark the item as editing. Returns the
    /// version to send with the request: the last one the server confirmed.
    pub fn begin_edit(&mut self, item_id: ItemId, patch: &ItemPatch) -> Option<u64> {
        let index = self.items.iter().position(|i| i.item_id == item_id)?;
        let current = &self.items[index];
        let state = self.editing.entry(item_id).or_insert_with(|| EditState {
            in_flight: 0,
            confirmed: current.clone(),
        });
        state.in_flight += 1;
        let expected = state.confirmed.version;

        // optimistic value keeps the confirmed version and timestamp
        let mut optimistic = patch.apply(current, current.updated_at);
        optimistic.version = current.version;
        self.items[index] = optimistic;
        Some(expected)
    }

    /// A request for the item succeeded with `record` as the stored state.
    pub fn confirm(&mut self, record: ItemRecord) {
        let item_id = record.item_id;
        let Some(state) = self.editing.get_mut(&item_id) else {
            // editing was cleared while the request was out
            self.adopt_if_newer(record);
            return;
        };
        if record.supersedes(&state.confirmed) {
            state.confirmed = record;
        }
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            let confirmed = state.confirmed.clone();
            self.editing.remove(&item_id);
            self.replace(confirmed);
            self.last_fingerprint = None;
        }
    }

    /// A request for the item failed. Once nothing else is outstanding the
    /// item falls back to its last confirmed state.
    pub fn fail(&mut self, item_id: ItemId) {
        let Some(state) = self.editing.get_mut(&item_id) else {
            return;
        };
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            let confirmed = state.confirmed.clone();
            self.editing.remove(&item_id);
            trace!(item_id = %item_id, version = confirmed.version, "edit rolled back");
            self.roll_back(confirmed);
        }
    }

    /// Forget every editing marker so the next merge applies to all items.
    /// Edited items go back to their last confirmed state first; requests
    /// still out for them only land if the server accepted them.
    pub fn clear_editing(&mut self) {
        let states: Vec<EditState> = self.editing.drain().map(|(_, state)| state).collect();
        for state in states {
            self.roll_back(state.confirmed);
        }
        self.last_fingerprint = None;
    }

    /// Reconcile a polled snapshot into the cache.
    ///
    /// Editing items keep their optimistic value. Every other item adopts the
    /// incoming record only when it supersedes the local one. Items the
    /// snapshot no longer carries are dropped unless they are being edited.
    pub fn merge_snapshot(&mut self, snapshot: &ListSnapshot) -> Result<MergeReport, CoreError> {
        let fingerprint = snapshot.fingerprint()?;
        if self.last_fingerprint == Some(fingerprint) {
            return Ok(MergeReport {
                skipped: true,
                ..MergeReport::default()
            });
        }

        let mut report = MergeReport::default();
        match &self.list {
            Some(local) if !snapshot.list.supersedes(local) => {}
            _ => {
                self.list = Some(snapshot.list.clone());
                report.list_adopted = true;
            }
        }

        let mut local: HashMap<ItemId, ItemRecord> =
            self.items.drain(..).map(|i| (i.item_id, i)).collect();
        let mut merged = Vec::with_capacity(snapshot.items.len());
        for incoming in &snapshot.items {
            match local.remove(&incoming.item_id) {
                Some(mine) => {
                    if let Some(state) = self.editing.get_mut(&incoming.item_id) {
                        if incoming.supersedes(&state.confirmed) {
                            state.confirmed = incoming.clone();
                        }
                        report.kept += 1;
                        merged.push(mine);
                    } else if incoming.supersedes(&mine) {
                        report.adopted += 1;
                        merged.push(incoming.clone());
                    } else {
                        report.kept += 1;
                        merged.push(mine);
                    }
                }
                None => {
                    report.added += 1;
                    merged.push(incoming.clone());
                }
            }
        }

        let mut leftovers: Vec<ItemRecord> = local.into_values().collect();
        leftovers.sort_by_key(|i| i.position);
        for item in leftovers {
            if self.editing.contains_key(&item.item_id) {
                report.kept += 1;
                merged.push(item);
            } else {
                report.removed += 1;
            }
        }

        self.items = merged;
        self.on_server = snapshot.items.iter().map(|i| i.item_id).collect();
        self.last_fingerprint = Some(fingerprint);
        trace!(
            adopted = report.adopted,
            kept = report.kept,
            added = report.added,
            removed = report.removed,
            "snapshot merged"
        );
        Ok(report)
    }

    fn replace(&mut self, record: ItemRecord) {
        if let Some(slot) = self.items.iter_mut().find(|i| i.item_id == record.item_id) {
            *slot = record;
        }
    }

    /// Put back the confirmed record, or drop the item if the server no
    /// longer had it at the last merge.
    fn roll_back(&mut self, confirmed: ItemRecord) {
        if self.on_server.contains(&confirmed.item_id) {
            self.replace(confirmed);
        } else {
            trace!(item_id = %confirmed.item_id, "rolled back item is gone on the server");
            self.items.retain(|i| i.item_id != confirmed.item_id);
        }
        self.last_fingerprint = None;
    }

    fn adopt_if_newer(&mut self, record: ItemRecord) {
        if let Some(slot) = self.items.iter_mut().find(|i| i.item_id == record.item_id) {
            if record.supersedes(slot) {
                *slot = record;
                self.last_fingerprint = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trolley_core::{
        ItemChanges, ListStatus, OwnerId, Quantity, Timestamp, Unit,
    };

    fn list() -> ListRecord {
        let now = Timestamp::from_millis(1_000);
        ListRecord {
            list_id: ListId::new(),
            owner_id: OwnerId::new(),
            recipe_id: None,
            status: ListStatus::Pending,
            title: "Groceries".into(),
            note: String::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(list_id: ListId, position: u32) -> ItemRecord {
        let now = Timestamp::from_millis(1_000);
        ItemRecord {
            item_id: ItemId::new(),
            list_id,
            ingredient_id: IngredientId::new(),
            quantity: Quantity::new(1.0, Quantity::DEFAULT_MAX).unwrap(),
            unit: Unit::Piece,
            checked: false,
            checked_at: None,
            version: 0,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    fn bumped(record: &ItemRecord, version: u64, checked: bool) -> ItemRecord {
        let mut next = record.clone();
        next.version = version;
        next.checked = checked;
        next.updated_at = Timestamp::from_millis(1_000 + version);
        next
    }

    fn seeded(items: usize) -> (LocalCache, ListRecord, Vec<ItemRecord>) {
        let list = list();
        let items: Vec<_> = (0..items as u32).map(|p| item(list.list_id, p)).collect();
        let mut cache = LocalCache::new();
        cache
            .merge_snapshot(&ListSnapshot::new(list.clone(), items.clone()))
            .unwrap();
        (cache, list, items)
    }

    fn check_patch() -> ItemPatch {
        ItemChanges::checked(true).validate(f64::MAX).unwrap()
    }

    #[test]
    fn editing_item_keeps_optimistic_value_against_older_poll() {
        let (mut cache, list, items) = seeded(1);
        let id = items[0].item_id;
        assert_eq!(cache.begin_edit(id, &check_patch()), Some(0));
        assert!(cache.item(id).unwrap().checked);

        cache
            .merge_snapshot(&ListSnapshot::new(list, vec![bumped(&items[0], 0, false)]))
            .unwrap();
        assert!(cache.item(id).unwrap().checked);
        assert!(cache.is_editing(id));
    }

    #[test]
    fn idle_item_adopts_newer_version() {
        let (mut cache, list, items) = seeded(1);
        let id = items[0].item_id;
        cache
            .merge_snapshot(&ListSnapshot::new(list.clone(), vec![bumped(&items[0], 3, false)]))
            .unwrap();
        assert_eq!(cache.item(id).unwrap().version, 3);

        let report = cache
            .merge_snapshot(&ListSnapshot::new(list, vec![bumped(&items[0], 5, true)]))
            .unwrap();
        assert_eq!(report.adopted, 1);
        let local = cache.item(id).unwrap();
        assert_eq!(local.version, 5);
        assert!(local.checked);
    }

    #[test]
    fn older_version_is_never_adopted() {
        let (mut cache, list, items) = seeded(1);
        let id = items[0].item_id;
        cache
            .merge_snapshot(&ListSnapshot::new(list.clone(), vec![bumped(&items[0], 4, true)]))
            .unwrap();
        cache
            .merge_snapshot(&ListSnapshot::new(list, vec![bumped(&items[0], 2, false)]))
            .unwrap();
        let local = cache.item(id).unwrap();
        assert_eq!(local.version, 4);
        assert!(local.checked);
    }

    #[test]
    fn identical_snapshot_is_skipped() {
        let (mut cache, list, items) = seeded(2);
        let report = cache
            .merge_snapshot(&ListSnapshot::new(list, items))
            .unwrap();
        assert!(report.skipped);
        assert!(!report.changed());
    }

    #[test]
    fn new_items_are_added_and_vanished_ones_dropped() {
        let (mut cache, list, items) = seeded(2);
        let extra = item(list.list_id, 2);
        let report = cache
            .merge_snapshot(&ListSnapshot::new(list, vec![items[0].clone(), extra.clone()]))
            .unwrap();
        assert_eq!((report.added, report.removed), (1, 1));
        let ids: Vec<_> = cache.items().iter().map(|i| i.item_id).collect();
        assert_eq!(ids, vec![items[0].item_id, extra.item_id]);
    }

    #[test]
    fn vanished_item_survives_while_editing() {
        let (mut cache, list, items) = seeded(2);
        cache.begin_edit(items[1].item_id, &check_patch());
        cache
            .merge_snapshot(&ListSnapshot::new(list, vec![items[0].clone()]))
            .unwrap();
        assert!(cache.item(items[1].item_id).is_some());
    }

    #[test]
    fn success_syncs_to_server_value() {
        let (mut cache, _, items) = seeded(1);
        let id = items[0].item_id;
        cache.begin_edit(id, &check_patch());
        cache.confirm(bumped(&items[0], 1, true));
        assert!(!cache.is_editing(id));
        assert_eq!(cache.item(id).unwrap().version, 1);
    }

    #[test]
    fn failure_restores_pre_edit_value() {
        let (mut cache, _, items) = seeded(1);
        let id = items[0].item_id;
        cache.begin_edit(id, &check_patch());
        cache.fail(id);
        assert!(!cache.is_editing(id));
        assert_eq!(cache.item(id), Some(&items[0]));
    }

    #[test]
    fn failure_with_requests_outstanding_keeps_editing() {
        let (mut cache, _, items) = seeded(1);
        let id = items[0].item_id;
        cache.begin_edit(id, &check_patch());
        cache.begin_edit(id, &check_patch());
        cache.fail(id);
        assert!(cache.is_editing(id));
        assert!(cache.item(id).unwrap().checked);
        cache.fail(id);
        assert!(!cache.item(id).unwrap().checked);
    }

    #[test]
    fn clearing_markers_drops_unsaved_values() {
        let (mut cache, list, items) = seeded(1);
        let id = items[0].item_id;
        cache.begin_edit(id, &check_patch());
        cache.clear_editing();
        assert!(!cache.item(id).unwrap().checked);

        // server never saw the change; same version comes back
        let unchanged = ListSnapshot::new(list, items.clone());
        cache.merge_snapshot(&unchanged).unwrap();
        assert!(!cache.item(id).unwrap().checked);

        cache.fail(id);
        cache.merge_snapshot(&unchanged).unwrap();
        assert_eq!(cache.item(id), Some(&items[0]));
    }

    #[test]
    fn late_success_after_clearing_is_still_adopted() {
        let (mut cache, _, items) = seeded(1);
        let id = items[0].item_id;
        cache.begin_edit(id, &check_patch());
        cache.clear_editing();
        cache.confirm(bumped(&items[0], 1, true));
        let local = cache.item(id).unwrap();
        assert_eq!(local.version, 1);
        assert!(local.checked);
    }

    #[test]
    fn failed_edit_of_deleted_item_removes_it() {
        let (mut cache, list, items) = seeded(2);
        let gone = items[1].item_id;
        cache.begin_edit(gone, &check_patch());
        let without = ListSnapshot::new(list, vec![items[0].clone()]);
        cache.merge_snapshot(&without).unwrap();
        assert!(cache.item(gone).is_some());

        cache.fail(gone);
        assert!(cache.item(gone).is_none());
        assert_eq!(cache.items().len(), 1);

        // the same snapshot is merged again, not skipped
        let report = cache.merge_snapshot(&without).unwrap();
        assert!(!report.skipped);
        assert_eq!(cache.items().len(), 1);
    }

    #[test]
    fn resolved_edit_invalidates_the_fingerprint() {
        let (mut cache, list, items) = seeded(1);
        let id = items[0].item_id;
        cache.begin_edit(id, &check_patch());
        cache.confirm(bumped(&items[0], 1, true));
        let report = cache
            .merge_snapshot(&ListSnapshot::new(list, items))
            .unwrap();
        assert!(!report.skipped);
        assert_eq!(cache.item(id).unwrap().version, 1);
    }

    #[test]
    fn rollback_uses_state_seen_while_editing() {
        let (mut cache, list, items) = seeded(1);
        let id = items[0].item_id;
        cache.begin_edit(id, &check_patch());
        let newer = bumped(&items[0], 2, false);
        cache
            .merge_snapshot(&ListSnapshot::new(list, vec![newer.clone()]))
            .unwrap();
        cache.fail(id);
        assert_eq!(cache.item(id), Some(&newer));
    }

    #[test]
    fn aggregate_tracks_cached_items() {
        let (mut cache, _, items) = seeded(3);
        cache.begin_edit(items[0].item_id, &check_patch());
        cache.begin_edit(items[1].item_id, &check_patch());
        let aggregate = cache.aggregate();
        assert_eq!(aggregate.checked_count, 2);
        assert_eq!(aggregate.completion_percentage, 66.7);
    }

    #[test]
    fn unknown_item_cannot_be_edited() {
        let (mut cache, _, _) = seeded(1);
        assert_eq!(cache.begin_edit(ItemId::new(), &check_patch()), None);
    }
}
