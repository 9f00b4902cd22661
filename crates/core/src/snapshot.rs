use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::ListAggregate;
use crate::error::CoreError;
use crate::model::{ItemRecord, ListRecord};

/// Authoritative view of one list as returned by a fetch: the list header,
/// every item in insertion order, and the aggregate computed at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub list: ListRecord,
    pub items: Vec<ItemRecord>,
    pub aggregate: ListAggregate,
}

impl ListSnapshot {
    pub fn new(list: ListRecord, items: Vec<ItemRecord>) -> Self {
        let aggregate = ListAggregate::compute(&items);
        Self {
            list,
            items,
            aggregate,
        }
    }

    pub fn item(&self, item_id: crate::ItemId) -> Option<&ItemRecord> {
        self.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Content digest of the encoded snapshot. Equal fingerprints mean nothing
    /// in the list changed between two fetches.
    pub fn fingerprint(&self) -> Result<SnapshotFingerprint, CoreError> {
        let bytes = self.to_msgpack()?;
        Ok(SnapshotFingerprint(*blake3::hash(&bytes).as_bytes()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotFingerprint([u8; 32]);

impl SnapshotFingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SnapshotFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotFingerprint({:02x}{:02x}...)", self.0[0], self.0[1])
    }
}
