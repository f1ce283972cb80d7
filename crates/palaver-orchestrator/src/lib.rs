//! palaver-orchestrator: Streaming consumer for conversation assertions.
//!
//! Receives batches of raw assertion records, folds them into durable
//! per-conversation state, decides whether the system should respond,
//! and emits decision/update events to downstream topics with a full
//! audit trail.

pub mod batch;
pub mod config;
pub mod decide;
pub mod emit;
pub mod error;
pub mod parser;
pub mod spool;
