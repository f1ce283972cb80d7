//! Error types for the palaver-orchestrator crate.

use thiserror::Error;

use palaver_store::StoreError;

use crate::emit::EmitError;
use crate::parser::ParseError;

/// A failure confined to one record. Never aborts sibling records in the
/// same batch; surfaced through the record's `ProcessingResult`.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Emit error: {0}")]
    Emit(#[from] EmitError),
}

impl RecordError {
    /// Whether transport-level redelivery of the record can help.
    /// Malformed input stays malformed; everything else is transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RecordError::Parse(_))
    }
}

/// A batch-level failure raised before per-record processing begins.
/// Propagates out of the invocation so the transport redelivers the
/// whole batch.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Event store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
