//! Wire events delivered to connected chat clients.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;
use crate::types::{MessageId, SessionId};

/// Client-visible error codes carried on [`WireEvent::Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SessionBusy,
    ProviderUnavailable,
    RateLimited,
    Timeout,
    Internal,
}

/// Events flowing from the orchestrator to the client.
///
/// Sequenced events (`message_received`, `ai_streaming`, `ai_complete`)
/// carry the session's gapless sequence number in their envelope;
/// `typing_indicator`, `session_joined`, and `error` are out-of-band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    SessionJoined {
        /// True when the session already had history (reconnect).
        resumed: bool,
    },
    MessageReceived {
        message: ChatMessage,
    },
    AiStreaming {
        /// Id of the assistant message this delta belongs to; the same id
        /// appears on the eventual `ai_complete` message, so clients can
        /// correlate deltas with history after a reconnect.
        message_id: MessageId,
        content_delta: String,
        /// Always false on deltas; completion is its own event.
        is_complete: bool,
    },
    AiComplete {
        message: ChatMessage,
        response_time_ms: u64,
    },
    TypingIndicator {
        typing: bool,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl WireEvent {
    /// Whether this event consumes a sequence number.
    pub fn is_sequenced(&self) -> bool {
        matches!(
            self,
            WireEvent::MessageReceived { .. }
                | WireEvent::AiStreaming { .. }
                | WireEvent::AiComplete { .. }
        )
    }
}

/// The envelope every delivered event is wrapped in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    /// Present only on sequenced events; strictly increasing and gapless
    /// within a session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub event: WireEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta() -> WireEvent {
        WireEvent::AiStreaming {
            message_id: MessageId::new(),
            content_delta: "hel".into(),
            is_complete: false,
        }
    }

    #[test]
    fn sequenced_classification() {
        assert!(delta().is_sequenced());
        assert!(!WireEvent::TypingIndicator { typing: true }.is_sequenced());
        assert!(
            !WireEvent::Error {
                code: ErrorCode::Timeout,
                message: "slow".into()
            }
            .is_sequenced()
        );
        assert!(!WireEvent::SessionJoined { resumed: false }.is_sequenced());
    }

    #[test]
    fn envelope_flattens_the_type_tag() {
        let event = SessionEvent {
            session_id: SessionId::new(),
            seq: Some(3),
            event: delta(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ai_streaming");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["content_delta"], "hel");
        assert_eq!(json["is_complete"], false);
        assert!(json["message_id"].is_string());
    }

    #[test]
    fn unsequenced_events_omit_seq() {
        let event = SessionEvent {
            session_id: SessionId::new(),
            seq: None,
            event: WireEvent::TypingIndicator { typing: true },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "typing_indicator");
        assert_eq!(json["typing"], true);
        assert!(json.get("seq").is_none());
    }

    #[test]
    fn error_codes_serialize_snake_case() {
        let json = serde_json::to_value(ErrorCode::SessionBusy).unwrap();
        assert_eq!(json, "session_busy");
    }
}
