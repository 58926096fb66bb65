//! PostgreSQL database integration
//!
//! Reads the source catalog and keeps the export log, queue and alert state
//! in PostgreSQL.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
pub use models::{StoredField, StoredSubfield};
