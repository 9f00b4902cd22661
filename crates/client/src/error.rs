use std::time::Duration;

use thiserror::Error;
use trolley_core::{CoreError, ErrorKind, ItemId, ValidationErrors};
use trolley_engine::{EngineError, ItemValidationError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("some items failed")]
    BatchInvalid { errors: Vec<ItemValidationError> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("item {0} is not in the local list")]
    UnknownItem(ItemId),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("poller has stopped")]
    Closed,

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) | Self::BatchInvalid { .. } => ErrorKind::Validation,
            Self::NotFound(_) | Self::UnknownItem(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Timeout(_) | Self::Closed | Self::Core(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<EngineError> for ClientError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(errors) => Self::Validation(errors),
            EngineError::BatchInvalid { errors } => Self::BatchInvalid { errors },
            other => match other.kind() {
                ErrorKind::Conflict => Self::Conflict(other.to_string()),
                ErrorKind::NotFound => Self::NotFound(other.to_string()),
                ErrorKind::Unauthorized => Self::Unauthorized(other.to_string()),
                ErrorKind::Validation | ErrorKind::Internal => Self::Internal(other.to_string()),
            },
        }
    }
}
