use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("list {list_id} already has an item for ingredient {ingredient_id}")]
    DuplicateIngredient {
        list_id: String,
        ingredient_id: String,
    },

    #[error("core error: {0}")]
    Core(#[from] trolley_core::CoreError),
}
