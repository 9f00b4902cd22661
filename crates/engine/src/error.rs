use serde::{Deserialize, Serialize};
use thiserror::Error;
use trolley_core::{CoreError, ErrorKind, ItemId, ValidationErrors};
use trolley_storage::StorageError;

/// Validation failure of one tuple in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemValidationError {
    /// Position of the tuple in the submitted batch.
    pub index: usize,
    pub item_id: ItemId,
    pub errors: ValidationErrors,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("list not found: {0}")]
    ListNotFound(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("recipe not found: {0}")]
    RecipeNotFound(String),

    #[error("list builder failed: {0}")]
    Builder(String),

    #[error("caller {caller} does not own list {list_id}")]
    Unauthorized { caller: String, list_id: String },

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("version conflict on item {item_id}: expected {expected}, current {current}")]
    ItemConflict {
        item_id: ItemId,
        expected: u64,
        current: u64,
    },

    #[error("version conflict on list {list_id}: expected {expected}, current {current}")]
    ListConflict {
        list_id: String,
        expected: u64,
        current: u64,
    },

    #[error("batch rejected: an item was modified concurrently")]
    BatchConflict,

    #[error("some items failed")]
    BatchInvalid { errors: Vec<ItemValidationError> },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ItemConflict { .. } | Self::ListConflict { .. } | Self::BatchConflict => {
                ErrorKind::Conflict
            }
            Self::Validation(_) | Self::BatchInvalid { .. } => ErrorKind::Validation,
            Self::ListNotFound(_) | Self::ItemNotFound(_) | Self::RecipeNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Storage(_) | Self::Core(_) | Self::Builder(_) => ErrorKind::Internal,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(ValidationErrors::single(field, message))
    }
}
