//! Sync orchestration
//!
//! - [`coordinator`] - one run for one record type
//! - [`summary`] - what the run did

pub mod coordinator;
pub mod summary;

pub use coordinator::{SyncCoordinator, SyncOptions};
pub use summary::{RunOutcome, SyncSummary};
