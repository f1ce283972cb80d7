//! Decision engine — pure policy over an assertion and conversation state.
//!
//! Deterministic for a given `(assertion, state, policy)` input: no
//! wall-clock reads, no randomness, no I/O. The same assertion replayed
//! from the audit log against the same state reproduces the same decision.

use palaver_core::{
    AssertionEvent, AssertionKind, ConversationState, Decision, DecisionKind,
};

/// Tunable decision parameters.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    /// Minimum confidence before an assertion can trigger a response on
    /// its own.
    pub confidence_threshold: f64,
    /// Consecutive negative-sentiment assertions that force an escalation.
    pub escalation_run_length: u32,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            escalation_run_length: 3,
        }
    }
}

impl DecisionPolicy {
    /// Reject configurations that make the policy unsatisfiable.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold must be within [0.0, 1.0], got {}",
                self.confidence_threshold
            ));
        }
        if self.escalation_run_length == 0 {
            return Err("escalation_run_length must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Decide whether and how to act on an assertion.
///
/// The most recent assertion always takes priority over older history:
/// its kind selects the rule, history only feeds the escalation run.
pub fn analyze(
    assertion: &AssertionEvent,
    state: Option<&ConversationState>,
    policy: &DecisionPolicy,
) -> Decision {
    let confidence = assertion.assertion.confidence;
    let confident = confidence >= policy.confidence_threshold;
    let escalated = state
        .and_then(|s| s.last_decision.as_ref())
        .is_some_and(|d| d.kind == DecisionKind::Escalate);

    match assertion.assertion.kind {
        AssertionKind::EscalationRecommendation => {
            if confident {
                decision(
                    true,
                    DecisionKind::Escalate,
                    format!("escalation recommended at confidence {confidence:.2}"),
                )
            } else {
                decision(
                    false,
                    DecisionKind::Defer,
                    format!(
                        "escalation recommended at confidence {confidence:.2}, below threshold {:.2}; awaiting corroboration",
                        policy.confidence_threshold
                    ),
                )
            }
        }

        AssertionKind::NegativeSentiment => {
            let run = negative_run(assertion, state);
            if run >= policy.escalation_run_length {
                // A sustained run escalates even when this assertion alone
                // is below the confidence threshold.
                decision(
                    true,
                    DecisionKind::Escalate,
                    format!(
                        "{run} consecutive negative-sentiment assertions reached run length {}",
                        policy.escalation_run_length
                    ),
                )
            } else if confident && !escalated {
                decision(
                    true,
                    DecisionKind::Respond,
                    format!("negative sentiment at confidence {confidence:.2} warrants a reply"),
                )
            } else if confident && escalated {
                decision(
                    false,
                    DecisionKind::NoAction,
                    "conversation already escalated to a human agent".to_string(),
                )
            } else {
                decision(
                    false,
                    DecisionKind::NoAction,
                    format!(
                        "negative sentiment at confidence {confidence:.2}, below threshold {:.2}",
                        policy.confidence_threshold
                    ),
                )
            }
        }

        AssertionKind::ResponseRecommendation => {
            if escalated {
                decision(
                    false,
                    DecisionKind::Defer,
                    "conversation escalated; deferring automated reply".to_string(),
                )
            } else if confident {
                decision(
                    true,
                    DecisionKind::Respond,
                    format!("response recommended at confidence {confidence:.2}"),
                )
            } else {
                decision(
                    false,
                    DecisionKind::Defer,
                    format!(
                        "response recommended at confidence {confidence:.2}, below threshold {:.2}",
                        policy.confidence_threshold
                    ),
                )
            }
        }

        AssertionKind::PositiveSentiment => decision(
            false,
            DecisionKind::NoAction,
            format!("positive sentiment at confidence {confidence:.2}; nothing to do"),
        ),
    }
}

fn decision(should_respond: bool, kind: DecisionKind, reasoning: String) -> Decision {
    Decision {
        should_respond,
        kind,
        reasoning,
    }
}

/// Length of the trailing run of consecutive negative-sentiment
/// assertions, counting the triggering assertion itself.
///
/// The history may or may not already contain the triggering assertion
/// (it does after the repository append); entries with its event id are
/// skipped so it is never counted twice.
fn negative_run(assertion: &AssertionEvent, state: Option<&ConversationState>) -> u32 {
    if assertion.assertion.kind != AssertionKind::NegativeSentiment {
        return 0;
    }

    let mut run = 1u32;
    if let Some(state) = state {
        for summary in state.assertions.iter().rev() {
            if summary.event_id == assertion.event_id {
                continue;
            }
            if summary.kind == AssertionKind::NegativeSentiment {
                run += 1;
            } else {
                break;
            }
        }
    }
    run
}
