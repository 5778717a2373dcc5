use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use engine::{orchestrator::Disposition, ControlContext, EngineConfig};
use integration::{Actuator, NullChatSink};
use shared::{
    domain::{ChannelHandle, CommandBinding, Identity, Mode},
    protocol::{ChatEvent, EngineEvent, RoundOutcome},
};
use tokio::{sync::broadcast, time::sleep};

#[derive(Default)]
struct MaskLog {
    masks: Mutex<Vec<u32>>,
}

impl MaskLog {
    fn masks(&self) -> Vec<u32> {
        self.masks.lock().expect("mask lock").clone()
    }

    fn clear(&self) {
        self.masks.lock().expect("mask lock").clear();
    }
}

#[async_trait]
impl Actuator for MaskLog {
    async fn apply_state(&self, bitmask: u32) -> anyhow::Result<()> {
        self.masks.lock().expect("mask lock").push(bitmask);
        Ok(())
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        bot_identity: Identity::new("crowdbot"),
        owner: Identity::new("streamer"),
        channel: ChannelHandle("stream".into()),
        prefix: Some('!'),
        buttons: 4,
        commands: ["a", "b", "left", "right"]
            .iter()
            .enumerate()
            .map(|(button, token)| CommandBinding {
                token: token.to_string(),
                button: button as u8,
            })
            .collect(),
        hold_short: Duration::from_millis(100),
        hold_long: Duration::from_millis(400),
        plan_size: 3,
        vote_open: Duration::from_secs(10),
        vote_closing: Duration::from_secs(5),
        mode_recheck: Duration::from_secs(30),
        initial_mode: Mode::Anarchy,
    }
}

async fn say(context: &ControlContext, author: &str, text: &str) -> Disposition {
    context
        .handle_chat_event(ChatEvent::Message {
            channel: ChannelHandle("stream".into()),
            author: Identity::new(author),
            text: text.to_string(),
        })
        .await
        .expect("handle message")
}

async fn wait_for(
    events: &mut broadcast::Receiver<EngineEvent>,
    wanted: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    loop {
        let event = events.recv().await.expect("engine event");
        if wanted(&event) {
            return event;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn crowd_moves_through_every_mode() {
    let device = Arc::new(MaskLog::default());
    let context = ControlContext::start(config(), device.clone(), Arc::new(NullChatSink))
        .await
        .expect("start");
    let mut events = context.subscribe_events();

    // Anarchy: every command presses right away.
    say(&context, "alice", "!left").await;
    say(&context, "bob", "!a").await;
    sleep(Duration::from_secs(1)).await;
    assert_eq!(device.masks(), vec![0, 0b0100, 0b0101, 0b0100, 0]);

    // Two of three voters want democracy; the third abstains.
    for user in ["alice", "bob", "carol"] {
        context
            .handle_chat_event(ChatEvent::Join {
                channel: ChannelHandle("stream".into()),
                user: Identity::new(user),
            })
            .await
            .expect("join");
    }
    say(&context, "alice", "!democracy").await;
    say(&context, "bob", "!Democracy").await;
    assert_eq!(
        wait_for(&mut events, |event| matches!(event, EngineEvent::ModeChanged { .. })).await,
        EngineEvent::ModeChanged {
            from: Mode::Anarchy,
            to: Mode::Democracy
        }
    );

    // Tied single round: the command configured first wins.
    device.clear();
    say(&context, "alice", "!b").await;
    say(&context, "bob", "!a").await;
    assert_eq!(
        say(&context, "carol", "!left,right").await,
        Disposition::Ballot(engine::tally::BallotOutcome::Rejected)
    );
    assert_eq!(
        wait_for(&mut events, |event| matches!(event, EngineEvent::RoundResolved { .. })).await,
        EngineEvent::RoundResolved {
            outcome: RoundOutcome::Command { token: "a".into() }
        }
    );
    sleep(Duration::from_secs(1)).await;
    assert_eq!(device.masks(), vec![0b0001, 0]);

    // Everyone switches to communism and votes a three step plan.
    for user in ["alice", "bob", "carol"] {
        say(&context, user, "!communism").await;
    }
    wait_for(&mut events, |event| {
        matches!(
            event,
            EngineEvent::ModeChanged {
                to: Mode::Communism,
                ..
            }
        )
    })
    .await;
    assert!(context.status().await.pending.is_none());

    device.clear();
    say(&context, "alice", "!left,a,right").await;
    say(&context, "bob", "!left,a,right").await;
    say(&context, "carol", "!right,b,left").await;
    assert_eq!(
        wait_for(&mut events, |event| matches!(event, EngineEvent::RoundResolved { .. })).await,
        EngineEvent::RoundResolved {
            outcome: RoundOutcome::Plan {
                tokens: vec!["left".into(), "a".into(), "right".into()]
            }
        }
    );
    sleep(Duration::from_secs(2)).await;
    assert_eq!(device.masks(), vec![0b0100, 0, 0b0001, 0, 0b1000, 0]);

    context.shutdown().await.expect("shutdown");
    assert_eq!(device.masks().last(), Some(&0));
}
