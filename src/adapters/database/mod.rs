//! Store abstraction layer
//!
//! Trait-based access to the source catalog and to the engine's own durable
//! state, with a PostgreSQL backend and an in-memory backend.

pub mod factory;
pub mod memory;
pub mod traits;

pub use factory::{create_stores, Stores};
pub use memory::InMemoryStore;
pub use traits::{
    AlertStateStore, CallbackLog, DatabaseClient, DeletedRecord, ExportLog, FileStore, QueueStore,
    RecordSource,
};
