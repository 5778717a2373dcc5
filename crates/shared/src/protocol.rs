use serde::{Deserialize, Serialize};

use crate::domain::{ChannelHandle, Identity, Mode, RoundKind};

/// Inbound traffic from the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChatEvent {
    Message {
        channel: ChannelHandle,
        author: Identity,
        text: String,
    },
    Join {
        channel: ChannelHandle,
        user: Identity,
    },
    Part {
        channel: ChannelHandle,
        user: Identity,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: ChannelHandle,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundOutcome {
    Command { token: String },
    Plan { tokens: Vec<String> },
    NoVotes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EngineEvent {
    ModePending {
        current: Mode,
        candidate: Mode,
    },
    ModeChanged {
        from: Mode,
        to: Mode,
    },
    RoundOpened {
        kind: RoundKind,
        window_secs: u64,
    },
    RoundClosing {
        kind: RoundKind,
        remaining_secs: u64,
    },
    RoundResolved {
        outcome: RoundOutcome,
    },
    /// A round whose mode was replaced before it could resolve.
    RoundDiscarded {
        kind: RoundKind,
    },
    CommandPressed {
        token: String,
    },
    PlanStarted {
        tokens: Vec<String>,
    },
    ActuatorFault {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_event_uses_tagged_payload() {
        let raw = r#"{"type":"message","payload":{"channel":"stream","author":"Alice","text":"!a"}}"#;
        let event: ChatEvent = serde_json::from_str(raw).expect("decode");
        assert_eq!(
            event,
            ChatEvent::Message {
                channel: ChannelHandle("stream".into()),
                author: Identity::new("alice"),
                text: "!a".into(),
            }
        );
    }

    #[test]
    fn engine_event_serializes_with_snake_case_tag() {
        let json = serde_json::to_value(EngineEvent::ModeChanged {
            from: Mode::Anarchy,
            to: Mode::Communism,
        })
        .expect("encode");
        assert_eq!(json["type"], "mode_changed");
        assert_eq!(json["payload"]["to"], "communism");
    }
}
