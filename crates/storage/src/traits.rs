use trolley_core::{ids::*, ItemRecord, ListRecord};

use crate::error::StorageError;

/// Result of a compare-and-swap write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome<T> {
    /// The expected version matched; carries the record as stored, version already advanced.
    Applied(T),
    /// The record moved on since the caller read it. Nothing was written.
    Stale { current_version: u64 },
    /// The record no longer exists.
    Missing,
}

impl<T> CasOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

pub trait RecordReader {
    fn get_list(&self, list_id: ListId) -> Result<Option<ListRecord>, StorageError>;

    fn lists_for_owner(&self, owner_id: OwnerId) -> Result<Vec<ListRecord>, StorageError>;

    fn get_item(&self, item_id: ItemId) -> Result<Option<ItemRecord>, StorageError>;

    /// Items of a list in insertion order.
    fn get_items(&self, list_id: ListId) -> Result<Vec<ItemRecord>, StorageError>;
}

/// Write access. Only available inside a unit of work, and the only place
/// version tokens are advanced.
pub trait RecordWriter: RecordReader {
    /// Inserts a list at version 0.
    fn insert_list(&mut self, list: &ListRecord) -> Result<(), StorageError>;

    /// Inserts an item at version 0, appended after the list's existing items.
    /// The record's `position` and `version` are ignored; the stored record is returned.
    fn insert_item(&mut self, item: &ItemRecord) -> Result<ItemRecord, StorageError>;

    /// Deletes a list and, by cascade, its items. Returns whether a row was removed.
    fn delete_list(&mut self, list_id: ListId) -> Result<bool, StorageError>;

    fn delete_item(&mut self, item_id: ItemId) -> Result<bool, StorageError>;

    /// Writes the mutable fields of `next` (quantity, unit, checked, checked_at,
    /// updated_at) if the stored version equals `expected_version`, advancing it by one.
    fn cas_item(
        &mut self,
        next: &ItemRecord,
        expected_version: u64,
    ) -> Result<CasOutcome<ItemRecord>, StorageError>;

    /// Writes status, title, note and updated_at of `next` under the same rule.
    fn cas_list(
        &mut self,
        next: &ListRecord,
        expected_version: u64,
    ) -> Result<CasOutcome<ListRecord>, StorageError>;
}
