use serde::{Deserialize, Serialize};
use trolley_core::Quantity;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound (inclusive) for item quantities.
    pub max_quantity: f64,
    /// Largest number of tuples accepted in one batch update.
    pub max_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_quantity: Quantity::DEFAULT_MAX,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}
