//! Batch orchestration — the per-invocation processing state machine.
//!
//! Records are processed sequentially in delivery order. A record failure
//! is recorded and the loop continues; only a failure before per-record
//! processing begins fails the whole invocation. Retry belongs to the
//! transport: the invocation itself always returns normally when the
//! per-record loop was reached.

use std::time::{Duration, Instant};

use palaver_core::{ConversationId, DecisionKind, LastDecision};
use palaver_store::{ConversationStateRepository, StatePatch};

use crate::decide::{self, DecisionPolicy};
use crate::emit::EventEmitter;
use crate::error::{OrchestratorError, RecordError, Result};
use crate::parser;

/// One opaque record as handed over by the transport.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Transport-assigned handle, used only for diagnostics.
    pub record_id: String,
    /// Base64-encoded UTF-8 JSON payload.
    pub data: Vec<u8>,
}

impl RawRecord {
    pub fn new(record_id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            record_id: record_id.into(),
            data: data.into(),
        }
    }
}

/// Remaining-time budget for one invocation.
///
/// When the time left falls below the reserve, the orchestrator stops
/// starting new records rather than risk being killed mid-write.
#[derive(Debug, Clone)]
pub struct InvocationBudget {
    deadline: Option<Instant>,
    reserve: Duration,
}

impl InvocationBudget {
    pub fn unbounded() -> Self {
        Self {
            deadline: None,
            reserve: Duration::ZERO,
        }
    }

    pub fn with_deadline(deadline: Instant, reserve: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            reserve,
        }
    }

    fn allows_another_record(&self) -> bool {
        match self.deadline {
            None => true,
            Some(deadline) => Instant::now() + self.reserve <= deadline,
        }
    }
}

/// Outcome of processing one record.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub record_id: String,
    pub success: bool,
    pub conversation_id: Option<ConversationId>,
    pub decision_kind: Option<DecisionKind>,
    pub decision_emitted: bool,
    pub update_emitted: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    /// Whether transport redelivery of this record can help.
    pub retryable: bool,
}

/// Aggregate counts for one invocation, for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Records never started because the time budget ran out.
    pub skipped: usize,
    pub decisions_emitted: usize,
    pub updates_emitted: usize,
}

/// Everything one invocation produced.
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<ProcessingResult>,
    pub summary: BatchSummary,
}

/// Top-level entry point: sequences parsing, state mutation, decision,
/// and emission per record. Collaborators are injected once per process.
pub struct Orchestrator {
    repository: ConversationStateRepository,
    emitter: EventEmitter,
    policy: DecisionPolicy,
}

impl Orchestrator {
    pub fn new(
        repository: ConversationStateRepository,
        emitter: EventEmitter,
        policy: DecisionPolicy,
    ) -> Result<Self> {
        policy.validate().map_err(OrchestratorError::Config)?;
        Ok(Self {
            repository,
            emitter,
            policy,
        })
    }

    /// Process one batch of records in delivery order.
    ///
    /// Returns `Err` only for failures before per-record processing
    /// begins; individual record failures live in the report.
    pub fn process_batch(
        &self,
        records: &[RawRecord],
        budget: &InvocationBudget,
    ) -> Result<BatchReport> {
        self.repository
            .health_check()
            .map_err(OrchestratorError::StoreUnavailable)?;

        let mut results = Vec::with_capacity(records.len());
        let mut summary = BatchSummary::default();

        for record in records {
            if !budget.allows_another_record() {
                summary.skipped = records.len() - results.len();
                tracing::warn!(
                    skipped = summary.skipped,
                    "Time budget exhausted; returning partial batch"
                );
                break;
            }

            let result = self.process_record(record);
            summary.processed += 1;
            if result.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            if result.decision_emitted {
                summary.decisions_emitted += 1;
            }
            if result.update_emitted {
                summary.updates_emitted += 1;
            }
            results.push(result);
        }

        tracing::info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            decisions = summary.decisions_emitted,
            updates = summary.updates_emitted,
            "Batch complete"
        );

        Ok(BatchReport { results, summary })
    }

    /// PARSE → READ/APPEND STATE → PERSIST ASSERTION → ANALYZE →
    /// [UPDATE path] → EMIT DECISION → RECORD last_decision.
    fn process_record(&self, record: &RawRecord) -> ProcessingResult {
        let start = Instant::now();
        let mut conversation_id = None;
        let mut decision_kind = None;
        let mut decision_emitted = false;
        let mut update_emitted = false;

        let outcome: std::result::Result<(), RecordError> = (|| {
            let event = parser::parse(&record.data)?;
            conversation_id = Some(event.conversation_id.clone());

            let state = self
                .repository
                .add_assertion(&event.conversation_id, event.summary())?;
            self.repository.save_assertion_event(&event)?;

            let decision = decide::analyze(&event, Some(&state), &self.policy);
            decision_kind = Some(decision.kind);
            tracing::debug!(
                conversation_id = %event.conversation_id,
                decision_kind = ?decision.kind,
                should_respond = decision.should_respond,
                reasoning = %decision.reasoning,
                "Assertion analyzed"
            );

            if self.emitter.emit_update(&event, &decision)?.is_some() {
                update_emitted = true;
                self.repository.update(
                    &event.conversation_id,
                    StatePatch {
                        responses_sent: Some(state.responses_sent + 1),
                        ..Default::default()
                    },
                )?;
            }

            let decision_event = self.emitter.emit_decision(&event, &decision)?;
            decision_emitted = true;

            self.repository.update(
                &event.conversation_id,
                StatePatch {
                    last_decision: Some(LastDecision {
                        kind: decision.kind,
                        made_at: decision_event.emitted_at,
                    }),
                    ..Default::default()
                },
            )?;

            Ok(())
        })();

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => ProcessingResult {
                record_id: record.record_id.clone(),
                success: true,
                conversation_id,
                decision_kind,
                decision_emitted,
                update_emitted,
                elapsed_ms,
                error: None,
                retryable: false,
            },
            Err(e) => {
                tracing::warn!(
                    record_id = %record.record_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Record processing failed"
                );
                ProcessingResult {
                    record_id: record.record_id.clone(),
                    success: false,
                    conversation_id,
                    decision_kind,
                    decision_emitted,
                    update_emitted,
                    elapsed_ms,
                    error: Some(e.to_string()),
                    retryable: e.is_retryable(),
                }
            }
        }
    }
}
