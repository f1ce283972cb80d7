//! File-system backed event store.
//!
//! Each conversation gets its own directory:
//! ```text
//! {root}/
//!   {conversation_id}/
//!     state.json    — mutable snapshot
//!     audit.ndjson  — append-only audit log, one record per line
//! ```
//!
//! Conversation ids are validated upstream to a path-safe charset before
//! they reach the store. The version check is process-local: the file is
//! read, compared, and rewritten without an OS-level lock, which is
//! sufficient because the transport partitions writers by conversation id.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use palaver_core::{ConversationId, ConversationState};

use crate::store::{EventStore, StoreError};
use crate::AuditRecord;

/// Event store persisting snapshots and audit logs as files.
pub struct FileEventStore {
    root: PathBuf,
}

impl FileEventStore {
    /// Create a store rooted at the given directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn conversation_dir(&self, id: &ConversationId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn state_path(&self, id: &ConversationId) -> PathBuf {
        self.conversation_dir(id).join("state.json")
    }

    fn audit_path(&self, id: &ConversationId) -> PathBuf {
        self.conversation_dir(id).join("audit.ndjson")
    }

    fn read_state_file(&self, path: &Path) -> Result<Option<ConversationState>, StoreError> {
        match fs::read_to_string(path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl EventStore for FileEventStore {
    fn health_check(&self) -> Result<(), StoreError> {
        fs::metadata(&self.root)?;
        Ok(())
    }

    fn get_state(&self, id: &ConversationId) -> Result<Option<ConversationState>, StoreError> {
        self.read_state_file(&self.state_path(id))
    }

    fn put_state(
        &self,
        state: &ConversationState,
        expected_version: Option<u64>,
    ) -> Result<(), StoreError> {
        let path = self.state_path(&state.conversation_id);
        let found = self.read_state_file(&path)?.map(|s| s.version);
        if found != expected_version {
            return Err(StoreError::VersionConflict {
                conversation_id: state.conversation_id.0.clone(),
                expected: expected_version,
                found,
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&path, json)?;

        tracing::debug!(
            conversation_id = %state.conversation_id,
            version = state.version,
            "State snapshot written"
        );

        Ok(())
    }

    fn append_record(&self, id: &ConversationId, record: &AuditRecord) -> Result<(), StoreError> {
        if record.content_hash.is_none() {
            return Err(StoreError::NotSealed);
        }

        let path = self.audit_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;

        tracing::debug!(
            conversation_id = %id,
            event_id = %record.event.event_id(),
            "Audit record appended"
        );

        Ok(())
    }

    fn read_records(&self, id: &ConversationId) -> Result<Vec<AuditRecord>, StoreError> {
        let path = self.audit_path(id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let record: AuditRecord = serde_json::from_str(line)?;
            if !record.verify_integrity() {
                return Err(StoreError::IntegrityViolation {
                    conversation_id: id.0.clone(),
                    event_id: record.event.event_id().to_string(),
                });
            }
            records.push(record);
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

    fn test_assertion(conversation: &str) -> AssertionEvent {
        AssertionEvent {
            event_id: EventId::new(),
            conversation_id: ConversationId::new(conversation),
            assertion: Assertion {
                kind: AssertionKind::NegativeSentiment,
                agent_id: "sentiment-agent".to_string(),
                confidence: 0.85,
                payload: serde_json::Value::Null,
            },
            metadata: EventMetadata {
                correlation_id: "corr-1".to_string(),
                occurred_at: Utc::now(),
            },
        }
    }

    #[test]
    fn state_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();

        let mut state = ConversationState::new(ConversationId::new("conv-1"), Utc::now());
        state.version = 1;
        store.put_state(&state, None).unwrap();

        let read = store.get_state(&state.conversation_id).unwrap().unwrap();
        assert_eq!(read, state);
    }

    #[test]
    fn missing_state_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();

        let read = store.get_state(&ConversationId::new("missing")).unwrap();
        assert!(read.is_none());
    }

    #[test]
    fn version_conflict_on_stale_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();

        let mut state = ConversationState::new(ConversationId::new("conv-1"), Utc::now());
        state.version = 1;
        store.put_state(&state, None).unwrap();

        state.version = 2;
        let result = store.put_state(&state, Some(7));
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[test]
    fn audit_log_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();
        let id = ConversationId::new("conv-1");

        let first = AuditRecord::seal(AuditEvent::Assertion(test_assertion("conv-1")));
        let second = AuditRecord::seal(AuditEvent::Assertion(test_assertion("conv-1")));
        store.append_record(&id, &first).unwrap();
        store.append_record(&id, &second).unwrap();

        let records = store.read_records(&id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], first);
        assert_eq!(records[1], second);
    }

    #[test]
    fn tampered_audit_record_detected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();
        let id = ConversationId::new("conv-1");

        let record = AuditRecord::seal(AuditEvent::Assertion(test_assertion("conv-1")));
        store.append_record(&id, &record).unwrap();

        // Tamper with the stored line: change the recorded timestamp.
        let path = dir.path().join("conv-1/audit.ndjson");
        let mut tampered: AuditRecord =
            serde_json::from_str(fs::read_to_string(&path).unwrap().lines().next().unwrap())
                .unwrap();
        tampered.recorded_at = tampered.recorded_at + chrono::TimeDelta::seconds(30);
        fs::write(&path, format!("{}\n", serde_json::to_string(&tampered).unwrap())).unwrap();

        let result = store.read_records(&id);
        assert!(matches!(result, Err(StoreError::IntegrityViolation { .. })));
    }

    #[test]
    fn logs_are_isolated_per_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();

        let a = ConversationId::new("conv-a");
        let b = ConversationId::new("conv-b");
        store
            .append_record(&a, &AuditRecord::seal(AuditEvent::Assertion(test_assertion("conv-a"))))
            .unwrap();

        assert_eq!(store.read_records(&a).unwrap().len(), 1);
        assert!(store.read_records(&b).unwrap().is_empty());
    }
}
