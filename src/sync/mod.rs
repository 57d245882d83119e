//! sync
//!
//! Local-first persistence of a graph to one or more providers.
//!
//! - [`changelog`]: mutations and the log of those not yet durable
//! - [`engine`]: debounced, quorum-acknowledged flushes
//! - [`replica`]: per-provider state, merge and retry
//! - [`merge`]: three-way triple merge
//! - [`history`]: append-only record of sync outcomes

pub mod changelog;
pub mod connection;
pub mod engine;
pub mod history;
pub mod merge;
pub mod replica;
pub mod retry;

pub use changelog::{ChangeEntry, ChangeLog, Mutation};
pub use connection::ProviderConnection;
pub use engine::{
    Applied, FlushReport, MigrationReport, SyncEngine, SyncError, SyncEvent, SyncOptions,
};
pub use history::{SyncHistory, SyncOutcome, SyncRecord, HISTORY_FILE};
pub use merge::{merge_graphs, MergeError};
pub use replica::ReplicaStatus;
pub use retry::RetryPolicy;
