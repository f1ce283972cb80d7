//! palaver-store: Durable conversation state and tamper-evident audit log.
//!
//! The mutable per-conversation snapshot and the append-only audit log are
//! independent writes against the same [`EventStore`]; a reader racing the
//! orchestrator may observe them out of order. Audit records are
//! content-hashed with BLAKE3 so tampering is detectable on read.

pub mod file;
pub mod hash;
pub mod repository;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use palaver_core::{AssertionEvent, ConversationId, DecisionEvent, EventId, UpdateEvent};

pub use file::FileEventStore;
pub use repository::{ConversationStateRepository, StatePatch};
pub use store::{EventStore, MemoryEventStore, StoreError};

// ── Audit Types ───────────────────────────────────────────────────

/// The event carried by an audit record, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "record_type")]
pub enum AuditEvent {
    Assertion(AssertionEvent),
    Decision(DecisionEvent),
    Update(UpdateEvent),
}

impl AuditEvent {
    pub fn event_id(&self) -> EventId {
        match self {
            AuditEvent::Assertion(e) => e.event_id,
            AuditEvent::Decision(e) => e.id,
            AuditEvent::Update(e) => e.id,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            AuditEvent::Assertion(e) => &e.conversation_id,
            AuditEvent::Decision(e) => &e.conversation_id,
            AuditEvent::Update(e) => &e.conversation_id,
        }
    }
}

/// One entry in the append-only audit log.
///
/// Records are immutable and never read back by the decision engine; they
/// exist for reconstruction and debugging. The log deliberately accepts
/// duplicates from redelivered records — readers deduplicate by event id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub event: AuditEvent,
    pub recorded_at: DateTime<Utc>,
    /// BLAKE3 content hash (hex) — set when the record is sealed.
    pub content_hash: Option<String>,
}

impl AuditRecord {
    /// Build a sealed record: stamp `recorded_at` and compute the hash.
    pub fn seal(event: AuditEvent) -> Self {
        let mut record = Self {
            event,
            recorded_at: Utc::now(),
            content_hash: None,
        };
        record.content_hash = Some(record.compute_hash());
        record
    }

    /// Compute the BLAKE3 hash over everything except `content_hash`.
    pub fn compute_hash(&self) -> String {
        hash::compute_record_hash(self)
    }

    /// Verify that the stored hash matches a freshly computed one.
    pub fn verify_integrity(&self) -> bool {
        match &self.content_hash {
            Some(stored) => stored == &self.compute_hash(),
            None => false,
        }
    }
}
