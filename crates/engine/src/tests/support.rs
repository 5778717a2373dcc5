use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use integration::{Actuator, ChatSink};
use shared::{
    domain::{ChannelHandle, CommandBinding, Identity, Mode},
    protocol::ChatEvent,
};
use tokio::time::Instant;

use crate::{registry::CommandRegistry, EngineConfig};

/// Records every mask handed to the device, stamped with virtual time.
pub(crate) struct RecordingActuator {
    started: Instant,
    history: Mutex<Vec<(Duration, u32)>>,
    /// Writes still to be rejected before the device starts accepting.
    failures: AtomicUsize,
}

impl RecordingActuator {
    pub(crate) fn new() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub(crate) fn failing() -> Arc<Self> {
        Self::failing_first(usize::MAX)
    }

    /// Rejects the first `failures` writes, then records normally.
    pub(crate) fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            history: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(failures),
        })
    }

    pub(crate) fn history(&self) -> Vec<(Duration, u32)> {
        self.history.lock().expect("history lock").clone()
    }

    pub(crate) fn masks(&self) -> Vec<u32> {
        self.history().into_iter().map(|(_, mask)| mask).collect()
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn apply_state(&self, bitmask: u32) -> Result<()> {
        let rejected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(anyhow!("device unplugged"));
        }
        self.history
            .lock()
            .expect("history lock")
            .push((self.started.elapsed(), bitmask));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingChat {
    sent: Mutex<Vec<(ChannelHandle, String)>>,
}

impl RecordingChat {
    pub(crate) fn sent(&self) -> Vec<(ChannelHandle, String)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl ChatSink for RecordingChat {
    async fn send(&self, channel: &ChannelHandle, text: &str) -> Result<()> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((channel.clone(), text.to_string()));
        Ok(())
    }
}

pub(crate) fn bindings(tokens: &[&str]) -> Vec<CommandBinding> {
    tokens
        .iter()
        .enumerate()
        .map(|(button, token)| CommandBinding {
            token: token.to_string(),
            button: button as u8,
        })
        .collect()
}

/// Registry with each token bound to the button matching its position.
pub(crate) fn registry(tokens: &[&str]) -> Arc<CommandRegistry> {
    Arc::new(CommandRegistry::new(8, &bindings(tokens)).expect("registry"))
}

/// Channel "stream", bot "crowdbot", owner "streamer", prefix '!'.
pub(crate) fn engine_config(tokens: &[&str], initial_mode: Mode) -> EngineConfig {
    EngineConfig {
        bot_identity: Identity::new("crowdbot"),
        owner: Identity::new("streamer"),
        channel: ChannelHandle("stream".into()),
        prefix: Some('!'),
        buttons: 8,
        commands: bindings(tokens),
        hold_short: Duration::from_millis(100),
        hold_long: Duration::from_millis(300),
        plan_size: 2,
        vote_open: Duration::from_secs(5),
        vote_closing: Duration::from_secs(2),
        mode_recheck: Duration::from_secs(10),
        initial_mode,
    }
}

pub(crate) fn message(author: &str, text: &str) -> ChatEvent {
    ChatEvent::Message {
        channel: ChannelHandle("stream".into()),
        author: Identity::new(author),
        text: text.to_string(),
    }
}
