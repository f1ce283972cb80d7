//! Core domain types for the Palaver response orchestrator.
//!
//! These types describe the assertion stream consumed from upstream AI
//! agents and the per-conversation aggregate the orchestrator maintains,
//! shared across all Palaver components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ───────────────────────────────────────────────────

/// Unique identifier for an event (assertion, decision, or update).
///
/// Assigned by the producer and used downstream for deduplication,
/// so redelivered records collapse to one logical event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a support conversation.
///
/// Opaque to this subsystem; it doubles as the transport partition key,
/// which is what keeps a single conversation single-writer per batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Assertions ────────────────────────────────────────────────────

/// The kind of claim an agent is making about a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssertionKind {
    NegativeSentiment,
    PositiveSentiment,
    ResponseRecommendation,
    EscalationRecommendation,
}

/// An AI agent's claim about a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assertion {
    /// What is being claimed.
    pub kind: AssertionKind,
    /// Which agent produced the claim.
    pub agent_id: String,
    /// Agent confidence in the claim (0.0 – 1.0).
    pub confidence: f64,
    /// Kind-specific structured payload (e.g. a suggested reply body).
    pub payload: serde_json::Value,
}

/// Provenance metadata attached to every assertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventMetadata {
    /// Correlation id threading the assertion back to its upstream trigger.
    pub correlation_id: String,
    /// When the agent made the claim.
    pub occurred_at: DateTime<Utc>,
}

/// A fully-formed assertion event as received from the transport.
///
/// Immutable once created; delivery may repeat, consumption is
/// logically exactly-once keyed by `event_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionEvent {
    pub event_id: EventId,
    pub conversation_id: ConversationId,
    pub assertion: Assertion,
    pub metadata: EventMetadata,
}

impl AssertionEvent {
    /// The compact history entry stored in the conversation aggregate.
    pub fn summary(&self) -> AssertionSummary {
        AssertionSummary {
            event_id: self.event_id,
            kind: self.assertion.kind,
            agent_id: self.assertion.agent_id.clone(),
            confidence: self.assertion.confidence,
            occurred_at: self.metadata.occurred_at,
        }
    }
}

// ── Conversation State ────────────────────────────────────────────

/// A compact record of one assertion, kept in the bounded history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionSummary {
    pub event_id: EventId,
    pub kind: AssertionKind,
    pub agent_id: String,
    pub confidence: f64,
    pub occurred_at: DateTime<Utc>,
}

/// The most recent decision recorded for a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastDecision {
    pub kind: DecisionKind,
    pub made_at: DateTime<Utc>,
}

/// The mutable per-conversation aggregate.
///
/// Created lazily on the first assertion for a conversation and never
/// deleted by this subsystem. Invariants enforced by the repository:
/// `responses_sent` only increases, `last_decision.made_at` is monotonic
/// non-decreasing, and `assertions` never grows beyond the retention cap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub conversation_id: ConversationId,
    /// Bounded ordered history of recent assertions, oldest first.
    pub assertions: Vec<AssertionSummary>,
    pub responses_sent: u64,
    pub last_decision: Option<LastDecision>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency version, incremented on every write.
    pub version: u64,
}

impl ConversationState {
    /// Fresh aggregate for a conversation with no history yet.
    pub fn new(conversation_id: ConversationId, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id,
            assertions: Vec::new(),
            responses_sent: 0,
            last_decision: None,
            updated_at: now,
            version: 0,
        }
    }
}

// ── Decisions ─────────────────────────────────────────────────────

/// The outcome kind of a decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Respond,
    Escalate,
    NoAction,
    Defer,
}

/// The decision engine's determination for one assertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub should_respond: bool,
    pub kind: DecisionKind,
    /// Human-readable diagnostic; never parsed downstream.
    pub reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertion_event_serialization_roundtrip() {
        let event = AssertionEvent {
            event_id: EventId::new(),
            conversation_id: ConversationId::new("conv-8842"),
            assertion: Assertion {
                kind: AssertionKind::NegativeSentiment,
                agent_id: "sentiment-agent".to_string(),
                confidence: 0.92,
                payload: serde_json::json!({"excerpt": "this is unacceptable"}),
            },
            metadata: EventMetadata {
                correlation_id: "corr-17".to_string(),
                occurred_at: Utc::now(),
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: AssertionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.event_id, deserialized.event_id);
        assert_eq!(event.assertion, deserialized.assertion);
    }

    #[test]
    fn assertion_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&AssertionKind::NegativeSentiment).unwrap();
        assert_eq!(json, "\"NEGATIVE_SENTIMENT\"");

        let json = serde_json::to_string(&AssertionKind::ResponseRecommendation).unwrap();
        assert_eq!(json, "\"RESPONSE_RECOMMENDATION\"");
    }

    #[test]
    fn decision_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&DecisionKind::NoAction).unwrap();
        assert_eq!(json, "\"NO_ACTION\"");
    }

    #[test]
    fn summary_carries_assertion_fields() {
        let event = AssertionEvent {
            event_id: EventId::new(),
            conversation_id: ConversationId::new("conv-1"),
            assertion: Assertion {
                kind: AssertionKind::ResponseRecommendation,
                agent_id: "reply-agent".to_string(),
                confidence: 0.4,
                payload: serde_json::Value::Null,
            },
            metadata: EventMetadata {
                correlation_id: "corr-1".to_string(),
                occurred_at: Utc::now(),
            },
        };

        let summary = event.summary();
        assert_eq!(summary.event_id, event.event_id);
        assert_eq!(summary.kind, AssertionKind::ResponseRecommendation);
        assert_eq!(summary.confidence, 0.4);
    }

    #[test]
    fn fresh_state_is_empty_at_version_zero() {
        let state = ConversationState::new(ConversationId::new("conv-2"), Utc::now());
        assert!(state.assertions.is_empty());
        assert_eq!(state.responses_sent, 0);
        assert!(state.last_decision.is_none());
        assert_eq!(state.version, 0);
    }
}
