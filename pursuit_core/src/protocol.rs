//! Inbound frame interpretation for the live channel.
//!
//! Every text frame the backend pushes is classified here before the
//! session acts on it: heartbeat acks disarm the liveness deadline,
//! server-sent errors surface through the error callback, incomplete
//! frames are dropped, and only recognizable state updates reach the
//! message callback.

use serde::Serialize;
use serde_json::Value;

use crate::model::StateUpdate;

/// Classification of one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Acknowledgement of a client heartbeat; disarms the ack deadline
    /// and is never forwarded.
    HeartbeatAck,

    /// A server-sent error payload; the channel stays open.
    ProtocolError(String),

    /// A state update carrying at least one recognized field.
    Update(StateUpdate),

    /// A structurally valid frame with no recognizable simulation-state
    /// content; dropped silently.
    Incomplete,
}

/// Classifies an inbound text frame.
///
/// Applied in order: heartbeat-ack marker, error payload, completeness
/// check, state update. A frame is complete when it carries at least one
/// of `hunters`, `targets`, `is_running`.
///
/// # Errors
/// Returns the parse error for frames that are not valid JSON; the
/// caller logs and discards those without surfacing them.
pub fn classify(raw: &str) -> Result<Inbound, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;

    if is_truthy(value.get("heartbeat")) {
        return Ok(Inbound::HeartbeatAck);
    }

    if let Some(error) = value.get("error") {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Ok(Inbound::ProtocolError(message));
    }

    let complete = value.get("hunters").is_some()
        || value.get("targets").is_some()
        || value.get("is_running").is_some();
    if !complete {
        return Ok(Inbound::Incomplete);
    }

    Ok(Inbound::Update(serde_json::from_value(value)?))
}

/// Outbound client heartbeat, sent every heartbeat interval.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Heartbeat,
}

/// Serializes the heartbeat frame: `{"type":"heartbeat"}`.
pub fn heartbeat_frame() -> String {
    // Serializing a unit variant of a tagged enum cannot fail.
    serde_json::to_string(&ClientMessage::Heartbeat).unwrap_or_else(|_| String::new())
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_frame_shape() {
        assert_eq!(heartbeat_frame(), r#"{"type":"heartbeat"}"#);
    }

    #[test]
    fn test_classify_heartbeat_ack() {
        let inbound =
            classify(r#"{"heartbeat": true, "timestamp": "2024-05-01T00:00:00"}"#).unwrap();
        assert_eq!(inbound, Inbound::HeartbeatAck);
    }

    #[test]
    fn test_classify_error_payload() {
        let inbound = classify(r#"{"error": "simulation step failed"}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::ProtocolError("simulation step failed".to_string())
        );
    }

    #[test]
    fn test_classify_error_wins_over_state_fields() {
        // Fault frames carry is_running alongside the error message.
        let inbound = classify(r#"{"error": "boom", "id": 4, "is_running": false}"#).unwrap();
        assert_eq!(inbound, Inbound::ProtocolError("boom".to_string()));
    }

    #[test]
    fn test_classify_full_update() {
        let raw = r#"{"id": 2, "hunters": [{"id": 1, "position": [1.0, 2.0]}],
                      "targets": [{"id": 1, "position": [5.0, 5.0]}],
                      "is_running": true, "step_count": 17}"#;
        match classify(raw).unwrap() {
            Inbound::Update(update) => {
                assert_eq!(update.id, Some(2));
                assert_eq!(update.hunters.as_ref().unwrap().len(), 1);
                assert_eq!(update.is_running, Some(true));
                assert_eq!(update.step_count, Some(17));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_running_flag_alone_is_complete() {
        let inbound = classify(r#"{"id": 2, "is_running": false}"#).unwrap();
        assert!(matches!(inbound, Inbound::Update(_)));
    }

    #[test]
    fn test_classify_incomplete_frame() {
        let inbound = classify(r#"{"id": 2, "timestamp": "now"}"#).unwrap();
        assert_eq!(inbound, Inbound::Incomplete);
    }

    #[test]
    fn test_classify_malformed_frame_is_parse_error() {
        assert!(classify("not json at all").is_err());
        assert!(classify(r#"{"hunters": "#).is_err());
    }

    #[test]
    fn test_classify_false_heartbeat_marker_is_not_ack() {
        // A falsy marker does not count as an acknowledgement.
        let inbound = classify(r#"{"heartbeat": false, "is_running": true}"#).unwrap();
        assert!(matches!(inbound, Inbound::Update(_)));
    }
}
