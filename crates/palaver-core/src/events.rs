//! Derived events published to downstream topics.
//!
//! Every processed assertion yields exactly one [`DecisionEvent`]; an
//! [`UpdateEvent`] exists only when the decision warrants a customer-facing
//! update and a concrete payload could be derived. Delivery downstream is
//! at-least-once; consumers deduplicate by event id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AssertionEvent, ConversationId, Decision, DecisionKind, EventId};

/// Namespace UUID for deterministic derived-event ids.
const PALAVER_NS: Uuid = Uuid::from_bytes([
    0x4f, 0x1c, 0x6e, 0x2a, 0x7d, 0x95, 0x4b, 0x3e, 0x9a, 0x01, 0x5c, 0xe2, 0x18, 0x77, 0xab, 0x40,
]);

/// Derive a stable event id from the triggering assertion.
///
/// A redelivered record re-derives the same id, so a retried emission is
/// indistinguishable downstream from the first attempt.
fn derived_event_id(tag: &str, triggered_by: EventId) -> EventId {
    EventId(Uuid::new_v5(
        &PALAVER_NS,
        format!("{tag}:{}", triggered_by.0).as_bytes(),
    ))
}

/// The orchestrator's decision for one assertion, published to the
/// decisions topic and persisted to the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionEvent {
    pub id: EventId,
    pub conversation_id: ConversationId,
    /// The assertion this decision was made for.
    pub triggered_by: EventId,
    pub decision: Decision,
    pub emitted_at: DateTime<Utc>,
}

impl DecisionEvent {
    pub fn for_assertion(assertion: &AssertionEvent, decision: Decision) -> Self {
        Self {
            id: derived_event_id("decision", assertion.event_id),
            conversation_id: assertion.conversation_id.clone(),
            triggered_by: assertion.event_id,
            decision,
            emitted_at: Utc::now(),
        }
    }
}

/// The customer-facing artifact carried by an update event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "update_type")]
pub enum UpdatePayload {
    /// The conversation was handed to a human agent.
    EscalationNotice { reason: String },
    /// A reply the system proposes to send into the conversation.
    SuggestedReply { body: String },
}

/// A customer-facing update, published to the updates topic and persisted
/// to the audit log. Emitted only when a decision warrants a response and
/// a concrete payload exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateEvent {
    pub id: EventId,
    pub conversation_id: ConversationId,
    /// The assertion this update traces back to.
    pub triggered_by: EventId,
    pub decision_kind: DecisionKind,
    pub payload: UpdatePayload,
    pub emitted_at: DateTime<Utc>,
}

impl UpdateEvent {
    pub fn for_assertion(
        assertion: &AssertionEvent,
        decision_kind: DecisionKind,
        payload: UpdatePayload,
    ) -> Self {
        Self {
            id: derived_event_id("update", assertion.event_id),
            conversation_id: assertion.conversation_id.clone(),
            triggered_by: assertion.event_id,
            decision_kind,
            payload,
            emitted_at: Utc::now(),
        }
    }
}
