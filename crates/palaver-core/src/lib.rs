//! palaver-core: Shared domain types for the Palaver response orchestrator.
//!
//! This crate provides the types used across all Palaver components:
//! - Assertion types (the claims AI agents make about a conversation)
//! - The per-conversation state aggregate and its history entries
//! - Decision types produced by the decision engine
//! - Derived events published to downstream topics

pub mod events;
pub mod types;

pub use events::{DecisionEvent, UpdateEvent, UpdatePayload};
pub use types::{
    Assertion, AssertionEvent, AssertionKind, AssertionSummary, ConversationId, ConversationState,
    Decision, DecisionKind, EventId, EventMetadata, LastDecision,
};
