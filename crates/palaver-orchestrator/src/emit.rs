//! Event emission — publish to downstream topics and persist for audit.
//!
//! Every processed assertion gets exactly one decision event so the audit
//! trail never has gaps; updates are conditional on the decision. Publish
//! and audit-append are independent, non-atomic writes: the audit append
//! happens regardless of publish outcome, and a failed publish surfaces
//! only after the record is durable.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use palaver_core::{
    AssertionEvent, Decision, DecisionEvent, DecisionKind, UpdateEvent, UpdatePayload,
};
use palaver_store::{ConversationStateRepository, StoreError};

/// Errors from publishing to a downstream topic.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish to topic {topic} failed: {reason}")]
    Failed { topic: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from emitting an event.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Audit persistence error: {0}")]
    Storage(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Downstream topic sink. The broker client behind this is constructed
/// once per process and injected.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, partition_key: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// The two logical destinations the orchestrator writes to.
#[derive(Debug, Clone)]
pub struct EmitterTopics {
    /// Decision events, consumed by downstream orchestration.
    pub decisions: String,
    /// Customer-facing update events.
    pub updates: String,
}

impl Default for EmitterTopics {
    fn default() -> Self {
        Self {
            decisions: "conversation-decisions".to_string(),
            updates: "conversation-updates".to_string(),
        }
    }
}

/// Publisher appending one NDJSON file per topic — the local sink used
/// by the file-backed deployment and replay tooling.
pub struct FilePublisher {
    root: PathBuf,
}

impl FilePublisher {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PublishError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }
}

impl Publisher for FilePublisher {
    fn publish(&self, topic: &str, partition_key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let path = self.root.join(format!("{topic}.ndjson"));
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(payload)?;
        file.write_all(b"\n")?;

        tracing::debug!(topic = %topic, partition_key = %partition_key, "Published");
        Ok(())
    }
}

/// A message captured by the in-memory publisher.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub partition_key: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct MemoryPublisherInner {
    messages: Vec<PublishedMessage>,
    failing_topics: HashSet<String>,
}

/// In-memory publisher for tests: captures messages and can be told to
/// fail a topic.
#[derive(Default)]
pub struct MemoryPublisher {
    inner: Mutex<MemoryPublisherInner>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `topic` fail until cleared.
    pub fn fail_topic(&self, topic: &str) {
        let mut inner = self.inner.lock().expect("Publisher lock poisoned");
        inner.failing_topics.insert(topic.to_string());
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock().expect("Publisher lock poisoned");
        inner.failing_topics.clear();
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        let inner = self.inner.lock().expect("Publisher lock poisoned");
        inner.messages.clone()
    }

    pub fn messages_for(&self, topic: &str) -> Vec<PublishedMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&self, topic: &str, partition_key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let mut inner = self.inner.lock().expect("Publisher lock poisoned");
        if inner.failing_topics.contains(topic) {
            return Err(PublishError::Failed {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        inner.messages.push(PublishedMessage {
            topic: topic.to_string(),
            partition_key: partition_key.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

/// Emits decision and update events to their topics and the audit log.
pub struct EventEmitter {
    publisher: Arc<dyn Publisher>,
    repository: ConversationStateRepository,
    topics: EmitterTopics,
}

impl EventEmitter {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        repository: ConversationStateRepository,
        topics: EmitterTopics,
    ) -> Self {
        Self {
            publisher,
            repository,
            topics,
        }
    }

    /// Construct, publish, and persist the decision event for an
    /// assertion. Always produces one — the audit trail has no gaps.
    pub fn emit_decision(
        &self,
        assertion: &AssertionEvent,
        decision: &Decision,
    ) -> Result<DecisionEvent, EmitError> {
        let event = DecisionEvent::for_assertion(assertion, decision.clone());
        let payload = serde_json::to_vec(&event)?;

        let publish_result = self.publisher.publish(
            &self.topics.decisions,
            assertion.conversation_id.as_str(),
            &payload,
        );
        if let Err(e) = &publish_result {
            tracing::warn!(
                conversation_id = %assertion.conversation_id,
                error = %e,
                "Decision publish failed; persisting for audit anyway"
            );
        }

        self.repository.save_decision_event(&event)?;
        publish_result?;
        Ok(event)
    }

    /// Construct, publish, and persist an update event when the decision
    /// warrants a response and a concrete payload can be derived.
    /// Returns `None` otherwise — an empty update is never fabricated.
    pub fn emit_update(
        &self,
        assertion: &AssertionEvent,
        decision: &Decision,
    ) -> Result<Option<UpdateEvent>, EmitError> {
        if !decision.should_respond {
            return Ok(None);
        }
        let Some(payload) = derive_update_payload(assertion, decision) else {
            tracing::debug!(
                conversation_id = %assertion.conversation_id,
                decision_kind = ?decision.kind,
                "No concrete update payload derivable; skipping update"
            );
            return Ok(None);
        };

        let event = UpdateEvent::for_assertion(assertion, decision.kind, payload);
        let bytes = serde_json::to_vec(&event)?;

        let publish_result = self.publisher.publish(
            &self.topics.updates,
            assertion.conversation_id.as_str(),
            &bytes,
        );
        if let Err(e) = &publish_result {
            tracing::warn!(
                conversation_id = %assertion.conversation_id,
                error = %e,
                "Update publish failed; persisting for audit anyway"
            );
        }

        self.repository.save_update_event(&event)?;
        publish_result?;
        Ok(Some(event))
    }
}

/// Derive the customer-facing artifact for a responding decision, if one
/// exists. Some decision kinds have none.
fn derive_update_payload(assertion: &AssertionEvent, decision: &Decision) -> Option<UpdatePayload> {
    match decision.kind {
        DecisionKind::Escalate => Some(UpdatePayload::EscalationNotice {
            reason: "Conversation escalated to a human support agent".to_string(),
        }),
        DecisionKind::Respond => assertion
            .assertion
            .payload
            .get("suggested_response")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| UpdatePayload::SuggestedReply {
                body: s.to_string(),
            }),
        DecisionKind::NoAction | DecisionKind::Defer => None,
    }
}
