//! Event store abstraction — trait + in-memory implementation.
//!
//! The store holds two things per conversation: the mutable state snapshot
//! (read/write with a compare-and-swap version check) and the append-only
//! audit log. Snapshot and log are independent writes.

use std::collections::HashMap;
use std::sync::Mutex;

use palaver_core::{ConversationId, ConversationState};

use crate::AuditRecord;

/// Errors from event store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(
        "Version conflict for conversation {conversation_id}: expected {expected:?}, found {found:?}"
    )]
    VersionConflict {
        conversation_id: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Integrity check failed for audit record {event_id} in conversation {conversation_id}")]
    IntegrityViolation {
        conversation_id: String,
        event_id: String,
    },

    #[error("Audit record has no content hash (not sealed)")]
    NotSealed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Narrow persistence interface consumed by the orchestrator.
///
/// `expected_version` on writes carries the version the caller read:
/// `Some(v)` requires the stored snapshot to still be at `v`, `None`
/// requires that no snapshot exists yet. A mismatch returns
/// [`StoreError::VersionConflict`] and the caller's read-modify-write is
/// retried via transport redelivery.
pub trait EventStore: Send + Sync {
    /// Cheap reachability probe, run before a batch starts. A failure
    /// here fails the whole invocation rather than every record in it.
    fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Read the current state snapshot.
    fn get_state(&self, id: &ConversationId) -> Result<Option<ConversationState>, StoreError>;

    /// Write the state snapshot, guarded by the version check.
    fn put_state(
        &self,
        state: &ConversationState,
        expected_version: Option<u64>,
    ) -> Result<(), StoreError>;

    /// Append a sealed record to the conversation's audit log.
    fn append_record(&self, id: &ConversationId, record: &AuditRecord) -> Result<(), StoreError>;

    /// Read the full audit log for a conversation, verifying integrity.
    fn read_records(&self, id: &ConversationId) -> Result<Vec<AuditRecord>, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    states: HashMap<ConversationId, ConversationState>,
    logs: HashMap<ConversationId, Vec<AuditRecord>>,
}

/// In-memory event store for tests and local development.
#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for MemoryEventStore {
    fn get_state(&self, id: &ConversationId) -> Result<Option<ConversationState>, StoreError> {
        let inner = self.inner.lock().expect("Store lock poisoned");
        Ok(inner.states.get(id).cloned())
    }

    fn put_state(
        &self,
        state: &ConversationState,
        expected_version: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("Store lock poisoned");
        let found = inner
            .states
            .get(&state.conversation_id)
            .map(|s| s.version);
        if found != expected_version {
            return Err(StoreError::VersionConflict {
                conversation_id: state.conversation_id.0.clone(),
                expected: expected_version,
                found,
            });
        }
        inner
            .states
            .insert(state.conversation_id.clone(), state.clone());
        Ok(())
    }

    fn append_record(&self, id: &ConversationId, record: &AuditRecord) -> Result<(), StoreError> {
        if record.content_hash.is_none() {
            return Err(StoreError::NotSealed);
        }
        let mut inner = self.inner.lock().expect("Store lock poisoned");
        inner.logs.entry(id.clone()).or_default().push(record.clone());
        Ok(())
    }

    fn read_records(&self, id: &ConversationId) -> Result<Vec<AuditRecord>, StoreError> {
        let inner = self.inner.lock().expect("Store lock poisoned");
        let records = inner.logs.get(id).cloned().unwrap_or_default();
        for record in &records {
            if !record.verify_integrity() {
                return Err(StoreError::IntegrityViolation {
                    conversation_id: id.0.clone(),
                    event_id: record.event.event_id().to_string(),
                });
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEvent;
    use chrono::Utc;
    use palaver_core::{
        Assertion, AssertionEvent, AssertionKind, EventId, EventMetadata,
    };

    fn test_state(id: &str, version: u64) -> ConversationState {
        let mut state = ConversationState::new(ConversationId::new(id), Utc::now());
        state.version = version;
        state
    }

    fn test_record(conversation: &str) -> AuditRecord {
        AuditRecord::seal(AuditEvent::Assertion(AssertionEvent {
            event_id: EventId::new(),
            conversation_id: ConversationId::new(conversation),
            assertion: Assertion {
                kind: AssertionKind::NegativeSentiment,
                agent_id: "sentiment-agent".to_string(),
                confidence: 0.8,
                payload: serde_json::Value::Null,
            },
            metadata: EventMetadata {
                correlation_id: "corr-1".to_string(),
                occurred_at: Utc::now(),
            },
        }))
    }

    #[test]
    fn put_and_get_state() {
        let store = MemoryEventStore::new();
        let state = test_state("conv-1", 1);

        store.put_state(&state, None).unwrap();
        let read = store.get_state(&state.conversation_id).unwrap().unwrap();
        assert_eq!(read, state);
    }

    #[test]
    fn put_rejects_stale_version() {
        let store = MemoryEventStore::new();
        let v1 = test_state("conv-1", 1);
        store.put_state(&v1, None).unwrap();

        let v2 = test_state("conv-1", 2);
        store.put_state(&v2, Some(1)).unwrap();

        // A writer that read version 1 loses the race.
        let stale = test_state("conv-1", 2);
        let result = store.put_state(&stale, Some(1));
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[test]
    fn put_rejects_create_when_state_exists() {
        let store = MemoryEventStore::new();
        let state = test_state("conv-1", 1);
        store.put_state(&state, None).unwrap();

        let result = store.put_state(&state, None);
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[test]
    fn append_and_read_records() {
        let store = MemoryEventStore::new();
        let id = ConversationId::new("conv-1");

        store.append_record(&id, &test_record("conv-1")).unwrap();
        store.append_record(&id, &test_record("conv-1")).unwrap();

        let records = store.read_records(&id).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn append_rejects_unsealed_record() {
        let store = MemoryEventStore::new();
        let id = ConversationId::new("conv-1");
        let mut record = test_record("conv-1");
        record.content_hash = None;

        let result = store.append_record(&id, &record);
        assert!(matches!(result, Err(StoreError::NotSealed)));
    }

    #[test]
    fn read_records_empty_for_unknown_conversation() {
        let store = MemoryEventStore::new();
        let records = store.read_records(&ConversationId::new("missing")).unwrap();
        assert!(records.is_empty());
    }
}
