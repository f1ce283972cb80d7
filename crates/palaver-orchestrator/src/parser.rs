//! Assertion record parsing and schema validation.
//!
//! Transport records carry base64-encoded UTF-8 JSON. A record that fails
//! to decode or validate is a data-quality condition, not a system fault:
//! the typed [`ParseError`] is logged and counted, never retried.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use palaver_core::AssertionEvent;

/// Errors from decoding or validating a raw record.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Malformed assertion JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema violation in {field}: {reason}")]
    Schema { field: &'static str, reason: String },
}

/// Decode and validate a raw transport record into a typed assertion.
///
/// Pure: no side effects, no I/O.
pub fn parse(raw: &[u8]) -> Result<AssertionEvent, ParseError> {
    let decoded = BASE64.decode(raw)?;
    let text = std::str::from_utf8(&decoded)?;
    let event: AssertionEvent = serde_json::from_str(text)?;
    validate(&event)?;
    Ok(event)
}

/// Encode an assertion event into the wire format. Inverse of [`parse`];
/// used by producer tooling and tests.
pub fn encode(event: &AssertionEvent) -> String {
    let json = serde_json::to_vec(event).expect("Assertion serialization should not fail");
    BASE64.encode(json)
}

fn validate(event: &AssertionEvent) -> Result<(), ParseError> {
    let conversation_id = event.conversation_id.as_str();
    if conversation_id.is_empty() {
        return Err(ParseError::Schema {
            field: "conversation_id",
            reason: "must not be empty".to_string(),
        });
    }
    // Conversation ids name storage paths downstream; keep them to a
    // conservative charset.
    if !conversation_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        || conversation_id.chars().all(|c| c == '.')
    {
        return Err(ParseError::Schema {
            field: "conversation_id",
            reason: format!("not a path-safe identifier: {conversation_id:?}"),
        });
    }

    if event.assertion.agent_id.is_empty() {
        return Err(ParseError::Schema {
            field: "assertion.agent_id",
            reason: "must not be empty".to_string(),
        });
    }

    let confidence = event.assertion.confidence;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ParseError::Schema {
            field: "assertion.confidence",
            reason: format!("must be within [0.0, 1.0], got {confidence}"),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use palaver_core::{Assertion, AssertionKind, ConversationId, EventId, EventMetadata};

    fn test_event(conversation: &str, confidence: f64) -> AssertionEvent {
        AssertionEvent {
            event_id: EventId::new(),
            conversation_id: ConversationId::new(conversation),
            assertion: Assertion {
                kind: AssertionKind::ResponseRecommendation,
                agent_id: "reply-agent".to_string(),
                confidence,
                payload: serde_json::json!({"suggested_response": "We can refund that order."}),
            },
            metadata: EventMetadata {
                correlation_id: "corr-3".to_string(),
                occurred_at: Utc::now(),
            },
        }
    }

    #[test]
    fn parse_roundtrips_encoded_event() {
        let event = test_event("conv-100", 0.9);
        let wire = encode(&event);

        let parsed = parse(wire.as_bytes()).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn rejects_invalid_base64() {
        let result = parse(b"!!! not base64 !!!");
        assert!(matches!(result, Err(ParseError::Base64(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        let wire = BASE64.encode(b"{\"event_id\": ");
        let result = parse(wire.as_bytes());
        assert!(matches!(result, Err(ParseError::Json(_))));
    }

    #[test]
    fn rejects_unknown_assertion_kind() {
        let mut value = serde_json::to_value(test_event("conv-1", 0.5)).unwrap();
        value["assertion"]["kind"] = serde_json::json!("MOOD_SWING");
        let wire = BASE64.encode(serde_json::to_vec(&value).unwrap());

        let result = parse(wire.as_bytes());
        assert!(matches!(result, Err(ParseError::Json(_))));
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let event = test_event("conv-1", 1.2);
        let result = parse(encode(&event).as_bytes());
        assert!(matches!(
            result,
            Err(ParseError::Schema {
                field: "assertion.confidence",
                ..
            })
        ));
    }

    #[test]
    fn rejects_empty_conversation_id() {
        let event = test_event("", 0.5);
        let result = parse(encode(&event).as_bytes());
        assert!(matches!(
            result,
            Err(ParseError::Schema {
                field: "conversation_id",
                ..
            })
        ));
    }

    #[test]
    fn rejects_path_unsafe_conversation_id() {
        let event = test_event("../escape", 0.5);
        let result = parse(encode(&event).as_bytes());
        assert!(matches!(
            result,
            Err(ParseError::Schema {
                field: "conversation_id",
                ..
            })
        ));
    }

    #[test]
    fn rejects_empty_agent_id() {
        let mut event = test_event("conv-1", 0.5);
        event.assertion.agent_id.clear();
        let result = parse(encode(&event).as_bytes());
        assert!(matches!(
            result,
            Err(ParseError::Schema {
                field: "assertion.agent_id",
                ..
            })
        ));
    }
}
