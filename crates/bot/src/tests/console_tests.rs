use super::*;
use shared::domain::Identity;

impl<W> ConsoleChat<W> {
    fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[tokio::test]
async fn chat_lines_are_outbound_json() {
    let chat = ConsoleChat::new(Vec::new());
    chat.send(&ChannelHandle("stream".into()), "vote result: a")
        .await
        .expect("send");
    chat.send(&ChannelHandle("stream".into()), "mode changed")
        .await
        .expect("send");

    let written = String::from_utf8(chat.into_inner()).expect("utf8");
    let lines: Vec<OutboundMessage> = written
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].text, "vote result: a");
    assert_eq!(lines[1].channel, ChannelHandle("stream".into()));
}

#[test]
fn parses_input_lines() {
    assert_eq!(parse_event("   ").expect("blank"), None);
    assert!(parse_event("not json").is_err());

    let event = parse_event(r#"{"type":"join","payload":{"channel":"stream","user":"Bob"}}"#)
        .expect("join");
    assert_eq!(
        event,
        Some(ChatEvent::Join {
            channel: ChannelHandle("stream".into()),
            user: Identity::new("bob"),
        })
    );
}

#[tokio::test]
async fn logging_actuator_accepts_every_mask() {
    let actuator = LoggingActuator::new(4);
    actuator.apply_state(0b1010).await.expect("apply");
    actuator.apply_state(u32::MAX).await.expect("apply");
}
