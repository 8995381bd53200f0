//! Streaming bulk-load pipeline
//!
//! Bytes from object storage flow through parse, validate, and format
//! stages into a Postgres COPY session. Stages are joined by bounded
//! channels, so memory use is fixed by channel capacity rather than file
//! size; a slow database backpressures all the way to the storage read.

pub mod format;
pub mod orchestrator;
pub mod parse;
pub mod sink;
pub mod validate;

pub use orchestrator::Orchestrator;
pub use sink::{BulkCopySession, BulkCopySink};

/// Rows buffered between stages before the sender blocks.
pub(crate) const STAGE_BUFFER: usize = 100;

/// Row that passed validation, ready to be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRow {
    pub provider: String,
    pub event_id: String,
    pub timestamp: String,
    pub data: String,
}
