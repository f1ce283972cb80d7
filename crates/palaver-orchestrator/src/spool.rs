//! Spool-directory consumer loop.
//!
//! Stands in for a managed broker subscription in file-backed deployments
//! and replay tooling: each `*.ndjson` file in the spool directory is one
//! batch, one base64-encoded record per line. Completed files are renamed
//! aside; a file interrupted by the time budget stays in place and is
//! re-consumed on the next tick, which is safe because record processing
//! is idempotent by event id.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::time::interval;

use crate::batch::{BatchReport, InvocationBudget, Orchestrator, RawRecord};
use crate::config::OrchestratorConfig;
use crate::error::Result;

/// Polls the spool directory and feeds batch files to the orchestrator.
pub struct SpoolConsumer {
    orchestrator: Orchestrator,
    spool_dir: PathBuf,
    poll_interval: Duration,
    max_batch: Option<Duration>,
    reserve: Duration,
}

impl SpoolConsumer {
    pub fn new(orchestrator: Orchestrator, config: &OrchestratorConfig) -> Self {
        let max_batch = match config.max_batch_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Self {
            orchestrator,
            spool_dir: PathBuf::from(&config.spool_dir),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_batch,
            reserve: Duration::from_millis(config.deadline_reserve_ms),
        }
    }

    /// Run the consumer loop. Blocks until the runtime shuts down.
    pub async fn run(&self) -> Result<()> {
        fs::create_dir_all(&self.spool_dir)?;
        tracing::info!(spool_dir = %self.spool_dir.display(), "Spool consumer started");

        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;

            for path in pending_batch_files(&self.spool_dir)? {
                match self.process_file(&path) {
                    Ok(report) => {
                        if report.summary.skipped > 0 {
                            tracing::warn!(
                                file = %path.display(),
                                skipped = report.summary.skipped,
                                "Batch interrupted by time budget; file left for re-consumption"
                            );
                        } else {
                            mark_done(&path)?;
                        }
                    }
                    Err(e) => {
                        // Fatal for this invocation; the file stays in
                        // place and is redelivered on the next tick.
                        tracing::error!(file = %path.display(), error = %e, "Batch failed");
                    }
                }
            }
        }
    }

    /// Process one batch file through the orchestrator.
    pub fn process_file(&self, path: &Path) -> Result<BatchReport> {
        let records = read_batch_file(path)?;
        tracing::info!(
            file = %path.display(),
            records = records.len(),
            "Consuming batch file"
        );

        let budget = match self.max_batch {
            None => InvocationBudget::unbounded(),
            Some(max) => InvocationBudget::with_deadline(Instant::now() + max, self.reserve),
        };
        self.orchestrator.process_batch(&records, &budget)
    }
}

/// Batch files waiting in the spool directory, oldest name first.
fn pending_batch_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("ndjson") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read a batch file into raw records; line numbers become record ids.
fn read_batch_file(path: &Path) -> Result<Vec<RawRecord>> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("batch")
        .to_string();
    let content = fs::read_to_string(path)?;

    Ok(content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| RawRecord::new(format!("{name}:{}", i + 1), line.trim().as_bytes().to_vec()))
        .collect())
}

fn mark_done(path: &Path) -> Result<()> {
    let done = path.with_extension("ndjson.done");
    fs::rename(path, &done)?;
    tracing::debug!(file = %done.display(), "Batch file archived");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use palaver_core::{
        Assertion, AssertionEvent, AssertionKind, ConversationId, EventId, EventMetadata,
    };
    use palaver_store::{ConversationStateRepository, MemoryEventStore};

    use crate::decide::DecisionPolicy;
    use crate::emit::{EmitterTopics, EventEmitter, MemoryPublisher};
    use crate::parser;

    fn consumer(spool_dir: &Path) -> SpoolConsumer {
        let repository =
            ConversationStateRepository::new(Arc::new(MemoryEventStore::new()), 50);
        let emitter = EventEmitter::new(
            Arc::new(MemoryPublisher::new()),
            repository.clone(),
            EmitterTopics::default(),
        );
        let orchestrator =
            Orchestrator::new(repository, emitter, DecisionPolicy::default()).unwrap();
        let config = OrchestratorConfig {
            spool_dir: spool_dir.to_string_lossy().into_owned(),
            ..Default::default()
        };
        SpoolConsumer::new(orchestrator, &config)
    }

    fn wire_line(conversation: &str) -> String {
        parser::encode(&AssertionEvent {
            event_id: EventId::new(),
            conversation_id: ConversationId::new(conversation),
            assertion: Assertion {
                kind: AssertionKind::PositiveSentiment,
                agent_id: "agent-1".to_string(),
                confidence: 0.9,
                payload: serde_json::Value::Null,
            },
            metadata: EventMetadata {
                correlation_id: "corr-1".to_string(),
                occurred_at: Utc::now(),
            },
        })
    }

    #[test]
    fn processes_batch_file_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch-0001.ndjson");
        fs::write(&path, format!("{}\n{}\n\n", wire_line("conv-1"), wire_line("conv-2"))).unwrap();

        let consumer = consumer(dir.path());
        let report = consumer.process_file(&path).unwrap();

        assert_eq!(report.summary.processed, 2);
        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.results[0].record_id, "batch-0001.ndjson:1");
    }

    #[test]
    fn pending_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.ndjson"), "").unwrap();
        fs::write(dir.path().join("a.ndjson"), "").unwrap();
        fs::write(dir.path().join("a.ndjson.done"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = pending_batch_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.ndjson", "b.ndjson"]);
    }
}
