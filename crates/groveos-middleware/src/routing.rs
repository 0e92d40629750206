//! Topic layout and inbound payload parsing.
//!
//! All traffic lives under a single configurable prefix:
//!
//! | Topic | Direction | Payload |
//! |---|---|---|
//! | `<prefix>/decisions` | inbound | [`DecisionMsg`] JSON |
//! | `<prefix>/approvals` | inbound | [`ApprovalMsg`] JSON |
//! | `<prefix>/status` | outbound | [`StatusSnapshot`] JSON |
//! | `<prefix>/logs/<category>` | outbound | `{timestamp, category, data}` |
//!
//! [`DecisionMsg`]: groveos_types::DecisionMsg
//! [`ApprovalMsg`]: groveos_types::ApprovalMsg
//! [`StatusSnapshot`]: groveos_types::StatusSnapshot

use groveos_types::{ApprovalMsg, DecisionMsg, LogCategory};
use tracing::warn;

pub fn decisions_topic(prefix: &str) -> String {
    format!("{prefix}/decisions")
}

pub fn approvals_topic(prefix: &str) -> String {
    format!("{prefix}/approvals")
}

pub fn status_topic(prefix: &str) -> String {
    format!("{prefix}/status")
}

pub fn logs_topic(prefix: &str, category: LogCategory) -> String {
    format!("{prefix}/logs/{}", category.as_str())
}

/// A parsed inbound bus message.
#[derive(Debug, Clone)]
pub enum BusInbound {
    Decision(DecisionMsg),
    Approval(ApprovalMsg),
}

/// Parse a raw publish into a typed inbound message.
///
/// Unknown topics and malformed payloads return `None`; a bad external
/// message must never take the control core down, so both are logged and
/// dropped here.
pub fn parse_inbound(prefix: &str, topic: &str, payload: &[u8]) -> Option<BusInbound> {
    if topic == decisions_topic(prefix) {
        match serde_json::from_slice::<DecisionMsg>(payload) {
            Ok(msg) => Some(BusInbound::Decision(msg)),
            Err(e) => {
                warn!(topic, error = %e, "dropping malformed decision payload");
                None
            }
        }
    } else if topic == approvals_topic(prefix) {
        match serde_json::from_slice::<ApprovalMsg>(payload) {
            Ok(msg) => Some(BusInbound::Approval(msg)),
            Err(e) => {
                warn!(topic, error = %e, "dropping malformed approval payload");
                None
            }
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groveos_types::DeviceAction;

    #[test]
    fn topic_layout_under_prefix() {
        assert_eq!(decisions_topic("greenhouse"), "greenhouse/decisions");
        assert_eq!(approvals_topic("greenhouse"), "greenhouse/approvals");
        assert_eq!(status_topic("greenhouse"), "greenhouse/status");
        assert_eq!(logs_topic("greenhouse", LogCategory::Llm), "greenhouse/logs/llm");
    }

    #[test]
    fn decision_payload_parses_on_decisions_topic() {
        let raw = br#"{"id": "d-1", "action": "light", "on": true}"#;
        match parse_inbound("greenhouse", "greenhouse/decisions", raw) {
            Some(BusInbound::Decision(msg)) => {
                assert_eq!(msg.id.as_deref(), Some("d-1"));
                assert_eq!(msg.action(), DeviceAction::SetLight { on: true });
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn approval_payload_parses_on_approvals_topic() {
        let raw = br#"{"id": "d-1", "approved": true}"#;
        match parse_inbound("greenhouse", "greenhouse/approvals", raw) {
            Some(BusInbound::Approval(msg)) => {
                assert_eq!(msg.id.as_deref(), Some("d-1"));
                assert_eq!(msg.verdict(), Some(true));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_is_dropped() {
        assert!(parse_inbound("greenhouse", "greenhouse/decisions", b"not json").is_none());
        assert!(parse_inbound("greenhouse", "greenhouse/approvals", b"[1, 2]").is_none());
    }

    #[test]
    fn unknown_topic_is_ignored() {
        let raw = br#"{"id": "d-1"}"#;
        assert!(parse_inbound("greenhouse", "greenhouse/other", raw).is_none());
        assert!(parse_inbound("greenhouse", "other/decisions", raw).is_none());
    }
}
