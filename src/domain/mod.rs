//! Domain models and types for dlsync.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`RecordId`], [`SourceName`], [`ExportId`])
//! - **Record model** ([`Record`], [`MirrorRecord`], [`Field`], [`Subfield`])
//! - **Sync state** ([`ExportLogEntry`], [`QueueEntry`], [`AlertState`], [`CallbackEntry`])
//! - **Error types** ([`SyncError`], [`MirrorError`])
//! - **Result type alias** ([`Result`])
//!
//! # Record Model
//!
//! Fields are a tagged variant: control fields carry a single value, data
//! fields carry ordered subfields. An unresolved cross-reference is a
//! subfield with an `xref` and no value.
//!
//! ```rust
//! use dlsync::domain::{Field, MarcFields, Record, RecordType, Subfield};
//!
//! let record = Record::new(RecordType::Bib, 42)
//!     .with_field(Field::data("191", ' ', ' ', vec![Subfield::new('a', "A/RES/1")]));
//!
//! assert_eq!(record.get_value("191", 'a'), Some("A/RES/1"));
//! assert_eq!(record.mirror_control_number(), "(DHL)42");
//! ```

pub mod attachment;
pub mod context;
pub mod errors;
pub mod export;
pub mod ids;
pub mod query;
pub mod record;
pub mod result;

// Re-export commonly used types for convenience
pub use attachment::{Language, StoredFile};
pub use errors::{MirrorError, SyncError};
pub use export::{
    AlertState, CallbackEntry, ExportLogEntry, ExportType, Nonce, QueueEntry, SubmitMode,
};
pub use ids::{ExportId, RecordId, SourceName};
pub use query::{FieldCondition, RecordFilter};
pub use record::{
    Collection, Field, FieldKind, MarcFields, MirrorRecord, Record, RecordRef, RecordType,
    Subfield, DELETED_STATUS,
};
pub use result::Result;
