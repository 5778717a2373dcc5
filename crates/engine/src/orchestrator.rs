use std::sync::Arc;

use integration::ChatSink;
use shared::{
    domain::{ChannelHandle, Identity, Mode},
    error::ControlError,
    protocol::{ChatEvent, EngineEvent},
};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    mode::ModeController,
    registry::PLAN_SEPARATOR,
    scheduler::CommandScheduler,
    status::describe_event,
    tally::{BallotOutcome, VoteTally},
};

/// What became of one inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Not addressed to the bot: wrong channel, own message, no prefix.
    Ignored,
    RosterUpdated,
    ModeVote { mode: Mode, accepted: bool },
    Queued { token: String },
    Ballot(BallotOutcome),
    UnknownCommand { token: String },
}

pub struct Orchestrator {
    bot_identity: Identity,
    channel: ChannelHandle,
    prefix: Option<char>,
    modes: Arc<ModeController>,
    tally: Arc<VoteTally>,
    scheduler: Arc<CommandScheduler>,
}

impl Orchestrator {
    pub fn new(
        bot_identity: Identity,
        channel: ChannelHandle,
        prefix: Option<char>,
        modes: Arc<ModeController>,
        tally: Arc<VoteTally>,
        scheduler: Arc<CommandScheduler>,
    ) -> Self {
        Self {
            bot_identity,
            channel,
            prefix,
            modes,
            tally,
            scheduler,
        }
    }

    pub async fn handle(&self, event: ChatEvent) -> Result<Disposition, ControlError> {
        match event {
            ChatEvent::Join { channel, user } if channel == self.channel => {
                self.modes.join(&user).await;
                Ok(Disposition::RosterUpdated)
            }
            ChatEvent::Part { channel, user } if channel == self.channel => {
                self.modes.part(&user).await;
                Ok(Disposition::RosterUpdated)
            }
            ChatEvent::Message {
                channel,
                author,
                text,
            } if channel == self.channel && author != self.bot_identity => {
                self.route_message(&author, &text).await
            }
            _ => Ok(Disposition::Ignored),
        }
    }

    async fn route_message(
        &self,
        author: &Identity,
        text: &str,
    ) -> Result<Disposition, ControlError> {
        let Some(body) = self.strip_prefix(text) else {
            return Ok(Disposition::Ignored);
        };

        if let Some(mode) = Mode::from_token(&body) {
            let accepted = self.modes.cast_mode_vote(author, mode).await;
            return Ok(Disposition::ModeVote { mode, accepted });
        }

        // Read once: a message racing a mode switch follows the old mode.
        let disposition = match self.modes.mode().await {
            Mode::Anarchy => match self.scheduler.enqueue_command(&body).await {
                Ok(()) => Disposition::Queued {
                    token: body.clone(),
                },
                Err(ControlError::UnknownCommand { token }) => {
                    debug!(%author, %token, "orchestrator: ignoring unknown command");
                    Disposition::UnknownCommand { token }
                }
                Err(err) => return Err(err),
            },
            Mode::Democracy => Disposition::Ballot(self.tally.cast_vote(author, &body).await),
            Mode::Communism => {
                let tokens: Vec<&str> = body.split(PLAN_SEPARATOR).map(str::trim).collect();
                Disposition::Ballot(self.tally.cast_plan_vote(author, &tokens).await)
            }
        };
        debug!(%author, text = %body, ?disposition, "orchestrator: routed message");
        Ok(disposition)
    }

    /// Normalized message body, or `None` when the message is not for us.
    fn strip_prefix(&self, text: &str) -> Option<String> {
        let text = text.trim();
        let body = match self.prefix {
            Some(prefix) => text.strip_prefix(prefix)?,
            None => text,
        };
        let body = body.trim().to_lowercase();
        (!body.is_empty()).then_some(body)
    }
}

/// Chat-worthy events; per-press and fault traffic stays in the logs.
fn announcement(event: &EngineEvent) -> Option<String> {
    match event {
        EngineEvent::RoundOpened { .. }
        | EngineEvent::RoundClosing { .. }
        | EngineEvent::RoundResolved { .. }
        | EngineEvent::RoundDiscarded { .. }
        | EngineEvent::ModePending { .. }
        | EngineEvent::ModeChanged { .. } => Some(describe_event(event)),
        EngineEvent::CommandPressed { .. }
        | EngineEvent::PlanStarted { .. }
        | EngineEvent::ActuatorFault { .. } => None,
    }
}

/// Forwards announcements to the channel until the event stream closes.
pub fn spawn_announcer(
    chat: Arc<dyn ChatSink>,
    channel: ChannelHandle,
    mut events: broadcast::Receiver<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "announcer: lagging behind engine events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(text) = announcement(&event) else {
                continue;
            };
            if let Err(err) = chat.send(&channel, &text).await {
                warn!(error = %err, "announcer: failed to send to chat");
            }
        }
        debug!("announcer: event stream closed");
    })
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
