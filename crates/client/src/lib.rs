//! Client side of the shopping-list engine: a local cache that reconciles
//! polled server snapshots with in-flight edits, and the poller that drives it.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod poll;
pub mod session;
pub mod transport;

pub use api::ListApi;
pub use cache::{LocalCache, MergeReport};
pub use config::ClientConfig;
pub use error::ClientError;
pub use poll::{PollHandle, PollScheduler, Poller};
pub use session::ListSession;
pub use transport::LocalTransport;
