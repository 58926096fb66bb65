//! Store construction
//!
//! All store traits are served by one backend sharing one connection pool.

use super::memory::InMemoryStore;
use super::traits::{
    AlertStateStore, CallbackLog, DatabaseClient, ExportLog, FileStore, QueueStore, RecordSource,
};
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::PostgreSQLConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Handles to every store the engine uses
#[derive(Clone)]
pub struct Stores {
    pub admin: Arc<dyn DatabaseClient>,
    pub records: Arc<dyn RecordSource>,
    pub files: Arc<dyn FileStore>,
    pub log: Arc<dyn ExportLog>,
    pub queue: Arc<dyn QueueStore>,
    pub callbacks: Arc<dyn CallbackLog>,
    pub alerts: Arc<dyn AlertStateStore>,
}

impl Stores {
    /// Serves every store from one backend
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: DatabaseClient
            + RecordSource
            + FileStore
            + ExportLog
            + QueueStore
            + CallbackLog
            + AlertStateStore
            + 'static,
    {
        Self {
            admin: backend.clone(),
            records: backend.clone(),
            files: backend.clone(),
            log: backend.clone(),
            queue: backend.clone(),
            callbacks: backend.clone(),
            alerts: backend,
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self::from_backend(store)
    }
}

/// Connects to PostgreSQL and builds the store bundle
///
/// # Errors
///
/// Returns an error if the connection pool cannot be created.
pub async fn create_stores(config: &PostgreSQLConfig) -> Result<Stores> {
    tracing::info!("Creating PostgreSQL stores");
    let client = Arc::new(PostgreSQLClient::new(config.clone()).await?);
    let adapter = Arc::new(PostgreSQLAdapter::new_with_arc(client));
    Ok(Stores::from_backend(adapter))
}
