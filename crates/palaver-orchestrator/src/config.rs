//! Configuration for the palaver-orchestrator consumer.

use serde::Deserialize;

use crate::decide::DecisionPolicy;
use crate::emit::EmitterTopics;

/// Top-level orchestrator configuration.
///
/// Loaded from `palaver.toml` `[orchestrator]` section or
/// `PALAVER_ORCHESTRATOR__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Root directory for the file-backed event store.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Directory where the file publisher writes topic logs.
    #[serde(default = "default_topic_dir")]
    pub topic_dir: String,

    /// Topic receiving decision events.
    #[serde(default = "default_decisions_topic")]
    pub decisions_topic: String,

    /// Topic receiving customer-facing update events.
    #[serde(default = "default_updates_topic")]
    pub updates_topic: String,

    /// Maximum assertion summaries retained per conversation.
    #[serde(default = "default_retention_cap")]
    pub assertion_retention_cap: usize,

    /// Minimum confidence before an assertion can trigger a response.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Consecutive negative-sentiment assertions that force escalation.
    #[serde(default = "default_escalation_run_length")]
    pub escalation_run_length: u32,

    /// Directory polled for incoming batch files in daemon mode.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: String,

    /// Spool poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Wall-clock budget per batch in milliseconds; 0 means unbounded.
    #[serde(default)]
    pub max_batch_ms: u64,

    /// Time reserved near the deadline to avoid starting a record that
    /// cannot finish.
    #[serde(default = "default_deadline_reserve")]
    pub deadline_reserve_ms: u64,
}

impl OrchestratorConfig {
    /// The decision parameters this configuration selects.
    pub fn decision_policy(&self) -> DecisionPolicy {
        DecisionPolicy {
            confidence_threshold: self.confidence_threshold,
            escalation_run_length: self.escalation_run_length,
        }
    }

    /// The downstream topic pair this configuration selects.
    pub fn topics(&self) -> EmitterTopics {
        EmitterTopics {
            decisions: self.decisions_topic.clone(),
            updates: self.updates_topic.clone(),
        }
    }
}

fn default_data_dir() -> String {
    "./palaver-data".to_string()
}

fn default_topic_dir() -> String {
    "./palaver-topics".to_string()
}

fn default_decisions_topic() -> String {
    "conversation-decisions".to_string()
}

fn default_updates_topic() -> String {
    "conversation-updates".to_string()
}

fn default_retention_cap() -> usize {
    50
}

fn default_confidence_threshold() -> f64 {
    0.85
}

fn default_escalation_run_length() -> u32 {
    3
}

fn default_spool_dir() -> String {
    "./palaver-spool".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_deadline_reserve() -> u64 {
    250
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            topic_dir: default_topic_dir(),
            decisions_topic: default_decisions_topic(),
            updates_topic: default_updates_topic(),
            assertion_retention_cap: default_retention_cap(),
            confidence_threshold: default_confidence_threshold(),
            escalation_run_length: default_escalation_run_length(),
            spool_dir: default_spool_dir(),
            poll_interval_secs: default_poll_interval(),
            max_batch_ms: 0,
            deadline_reserve_ms: default_deadline_reserve(),
        }
    }
}
