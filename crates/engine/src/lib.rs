use std::{sync::Arc, time::Duration};

use integration::{Actuator, ChatSink};
use shared::{
    domain::{ChannelHandle, CommandBinding, Identity, Mode},
    error::ControlError,
    protocol::{ChatEvent, EngineEvent},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod actuator;
pub mod mode;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod tally;

use actuator::{ActuatorGateway, HoldTimings};
use mode::{ModeController, VoterRoster};
use orchestrator::{spawn_announcer, Disposition, Orchestrator};
use registry::CommandRegistry;
use scheduler::CommandScheduler;
use status::StatusSnapshot;
use tally::{RoundTimings, VoteTally};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bot_identity: Identity,
    pub owner: Identity,
    pub channel: ChannelHandle,
    /// Messages must start with this character to be read at all.
    pub prefix: Option<char>,
    pub buttons: u8,
    pub commands: Vec<CommandBinding>,
    pub hold_short: Duration,
    pub hold_long: Duration,
    pub plan_size: usize,
    pub vote_open: Duration,
    pub vote_closing: Duration,
    pub mode_recheck: Duration,
    pub initial_mode: Mode,
}

impl EngineConfig {
    fn validate(&self) -> Result<(), ControlError> {
        if self.plan_size == 0 {
            return Err(ControlError::invalid_config("plan size must be at least 1"));
        }
        if self.mode_recheck.is_zero() {
            return Err(ControlError::invalid_config(
                "mode recheck period must be positive",
            ));
        }
        if self.prefix.is_some_and(|prefix| prefix.is_whitespace()) {
            return Err(ControlError::invalid_config("prefix cannot be whitespace"));
        }
        Ok(())
    }
}

/// Everything the controller owns, built once at startup.
pub struct ControlContext {
    gateway: Arc<ActuatorGateway>,
    scheduler: Arc<CommandScheduler>,
    tally: Arc<VoteTally>,
    modes: Arc<ModeController>,
    orchestrator: Orchestrator,
    events: broadcast::Sender<EngineEvent>,
    announcer: Mutex<Option<JoinHandle<()>>>,
}

impl ControlContext {
    pub async fn start(
        config: EngineConfig,
        actuator: Arc<dyn Actuator>,
        chat: Arc<dyn ChatSink>,
    ) -> Result<Arc<Self>, ControlError> {
        config.validate()?;
        let registry = Arc::new(CommandRegistry::new(config.buttons, &config.commands)?);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let gateway = ActuatorGateway::new(
            Arc::clone(&registry),
            actuator,
            HoldTimings {
                short: config.hold_short,
                long: config.hold_long,
            },
            events.clone(),
        );
        let scheduler = CommandScheduler::start(
            Arc::clone(&registry),
            Arc::clone(&gateway),
            events.clone(),
        )
        .await;
        let tally = VoteTally::new(
            Arc::clone(&registry),
            Arc::clone(&scheduler),
            config.plan_size,
            RoundTimings {
                open: config.vote_open,
                closing: config.vote_closing,
            },
            events.clone(),
        );
        let roster = VoterRoster::new([config.bot_identity.clone(), config.owner.clone()]);
        let modes = ModeController::new(
            config.initial_mode,
            roster,
            Arc::clone(&tally),
            Arc::clone(&scheduler),
            Arc::clone(&gateway),
            config.mode_recheck,
            events.clone(),
        );
        modes.enter(config.initial_mode).await;

        let orchestrator = Orchestrator::new(
            config.bot_identity,
            config.channel.clone(),
            config.prefix,
            Arc::clone(&modes),
            Arc::clone(&tally),
            Arc::clone(&scheduler),
        );
        let announcer = spawn_announcer(chat, config.channel, events.subscribe());

        info!(
            commands = registry.len(),
            buttons = registry.button_count(),
            mode = %config.initial_mode,
            "engine: started"
        );
        Ok(Arc::new(Self {
            gateway,
            scheduler,
            tally,
            modes,
            orchestrator,
            events,
            announcer: Mutex::new(Some(announcer)),
        }))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn handle_chat_event(&self, event: ChatEvent) -> Result<Disposition, ControlError> {
        self.orchestrator.handle(event).await
    }

    pub async fn status(&self) -> StatusSnapshot {
        let state = self.modes.state().await;
        StatusSnapshot {
            mode: state.current(),
            pending: state.candidate(),
            counts: self.modes.roster().counts().await,
            voters: self.modes.roster().len().await,
            tally: self.tally.snapshot().await,
            lanes: self.scheduler.depths().await,
        }
    }

    /// Stops every timer and worker, then releases all buttons.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.modes.shutdown().await;
        self.tally.shutdown().await;
        self.scheduler.shutdown().await;
        let released = self.gateway.reset().await;
        if let Some(announcer) = self.announcer.lock().await.take() {
            announcer.abort();
        }
        match &released {
            Ok(()) => info!("engine: stopped"),
            Err(err) => warn!(error = %err, "engine: stopped with buttons in unknown state"),
        }
        released
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
