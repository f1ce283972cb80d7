//! Conversation state repository — read/modify/write access to the
//! per-conversation aggregate, plus audit log appends.
//!
//! All snapshot writes go through the store's compare-and-swap version
//! check; a losing writer surfaces a `VersionConflict` that the batch
//! orchestrator reports as a per-record failure, leaving retry to the
//! transport.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use palaver_core::{
    AssertionEvent, AssertionSummary, ConversationId, ConversationState, DecisionEvent,
    LastDecision, UpdateEvent,
};

use crate::store::{EventStore, StoreError};
use crate::{AuditEvent, AuditRecord};

/// Closed, explicitly-typed patch for a conversation snapshot.
///
/// Merge rule is last-writer-wins per field, bounded by the aggregate's
/// monotonic invariants: `responses_sent` never decreases and
/// `last_decision` is never replaced by an older one.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub responses_sent: Option<u64>,
    pub last_decision: Option<LastDecision>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository over an [`EventStore`] enforcing the aggregate's invariants.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct ConversationStateRepository {
    store: Arc<dyn EventStore>,
    retention_cap: usize,
}

impl ConversationStateRepository {
    pub fn new(store: Arc<dyn EventStore>, retention_cap: usize) -> Self {
        Self {
            store,
            retention_cap,
        }
    }

    /// Probe the underlying store before starting a batch.
    pub fn health_check(&self) -> Result<(), StoreError> {
        self.store.health_check()
    }

    /// Read the current snapshot. No lock is held across calls.
    pub fn get(&self, id: &ConversationId) -> Result<Option<ConversationState>, StoreError> {
        self.store.get_state(id)
    }

    /// Append an assertion to the history, creating the aggregate lazily.
    ///
    /// Enforces the retention cap by evicting the oldest entries, bumps
    /// `updated_at` and `version`, and returns the resulting state.
    /// A redelivered assertion already present in the retained history
    /// (same event id) is a no-op returning the current state.
    pub fn add_assertion(
        &self,
        id: &ConversationId,
        summary: AssertionSummary,
    ) -> Result<ConversationState, StoreError> {
        let now = Utc::now();
        let existing = self.store.get_state(id)?;
        let expected = existing.as_ref().map(|s| s.version);

        if let Some(state) = &existing {
            if state.assertions.iter().any(|s| s.event_id == summary.event_id) {
                return Ok(state.clone());
            }
        }

        let mut state = existing.unwrap_or_else(|| ConversationState::new(id.clone(), now));
        state.assertions.push(summary);
        if state.assertions.len() > self.retention_cap {
            let overflow = state.assertions.len() - self.retention_cap;
            state.assertions.drain(..overflow);
        }
        state.updated_at = now;
        state.version += 1;

        self.store.put_state(&state, expected)?;
        Ok(state)
    }

    /// Merge a patch into the stored aggregate and return the result.
    pub fn update(
        &self,
        id: &ConversationId,
        patch: StatePatch,
    ) -> Result<ConversationState, StoreError> {
        let mut state = self
            .store
            .get_state(id)?
            .ok_or_else(|| StoreError::NotFound(id.0.clone()))?;
        let expected = Some(state.version);

        if let Some(sent) = patch.responses_sent {
            // Counter only moves forward.
            state.responses_sent = state.responses_sent.max(sent);
        }
        if let Some(decision) = patch.last_decision {
            let newer = state
                .last_decision
                .as_ref()
                .map_or(true, |cur| decision.made_at >= cur.made_at);
            if newer {
                state.last_decision = Some(decision);
            } else {
                tracing::debug!(
                    conversation_id = %id,
                    "Skipping last_decision patch older than stored decision"
                );
            }
        }
        state.updated_at = patch.updated_at.unwrap_or_else(Utc::now);
        state.version += 1;

        self.store.put_state(&state, expected)?;
        Ok(state)
    }

    /// Append the assertion to the durable audit log.
    pub fn save_assertion_event(&self, event: &AssertionEvent) -> Result<(), StoreError> {
        let record = AuditRecord::seal(AuditEvent::Assertion(event.clone()));
        self.store.append_record(&event.conversation_id, &record)
    }

    /// Append the decision event to the durable audit log.
    pub fn save_decision_event(&self, event: &DecisionEvent) -> Result<(), StoreError> {
        let record = AuditRecord::seal(AuditEvent::Decision(event.clone()));
        self.store.append_record(&event.conversation_id, &record)
    }

    /// Append the update event to the durable audit log.
    pub fn save_update_event(&self, event: &UpdateEvent) -> Result<(), StoreError> {
        let record = AuditRecord::seal(AuditEvent::Update(event.clone()));
        self.store.append_record(&event.conversation_id, &record)
    }

    /// Read the audit log back, verifying integrity. Debug/replay only —
    /// the decision engine never reads this.
    pub fn audit_log(&self, id: &ConversationId) -> Result<Vec<AuditRecord>, StoreError> {
        self.store.read_records(id)
    }
}
