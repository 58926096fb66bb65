//! Remote catalog ("mirror") integration
//!
//! - [`client`] - search and record submission over HTTP
//! - [`xml`] - MARCXML writer and pull reader
//! - [`retry`] - retry policy for searches
//! - [`memory`] - in-process mirror for tests and local runs

pub mod client;
pub mod memory;
pub mod retry;
pub mod xml;

pub use client::{
    HttpMirrorClient, MirrorClient, MirrorResult, SubmissionRequest, SubmitResponse,
    RATE_LIMIT_SIGNAL,
};
pub use memory::{InMemoryMirror, ReceivedSubmission};
pub use retry::RetryPolicy;
pub use xml::{to_marcxml, to_marcxml_collection, MirrorRecordReader};
