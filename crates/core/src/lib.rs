pub mod aggregate;
pub mod changes;
pub mod clock;
pub mod error;
pub mod ids;
pub mod model;
pub mod snapshot;
pub mod validation;

pub use aggregate::ListAggregate;
pub use changes::{ItemChangeRequest, ItemChanges, ItemPatch, ListChanges, NewItem, NewList};
pub use clock::{Clock, Timestamp};
pub use error::{CoreError, ErrorKind};
pub use ids::*;
pub use model::{ItemRecord, ListRecord, ListStatus, Quantity, Unit};
pub use snapshot::{ListSnapshot, SnapshotFingerprint};
pub use validation::ValidationErrors;
