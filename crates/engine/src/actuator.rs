use std::{sync::Arc, time::Duration};

use integration::Actuator;
use shared::{
    domain::{render_bitmask, HoldClass},
    error::ControlError,
    protocol::EngineEvent,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error};

use crate::registry::CommandRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldTimings {
    pub short: Duration,
    pub long: Duration,
}

impl HoldTimings {
    pub fn duration(&self, class: HoldClass) -> Duration {
        match class {
            HoldClass::Short => self.short,
            HoldClass::Long => self.long,
        }
    }
}

struct ButtonBank {
    pressed: Vec<bool>,
    /// Bumped whenever a press supersedes the release armed for that button.
    generations: Vec<u64>,
    release_timers: Vec<Option<JoinHandle<()>>>,
}

impl ButtonBank {
    fn new(buttons: u8) -> Self {
        let len = usize::from(buttons);
        Self {
            pressed: vec![false; len],
            generations: vec![0; len],
            release_timers: (0..len).map(|_| None).collect(),
        }
    }

    fn bitmask(&self) -> u32 {
        self.pressed
            .iter()
            .enumerate()
            .filter(|(_, pressed)| **pressed)
            .fold(0, |mask, (bit, _)| mask | (1 << bit))
    }

    /// Cancels the pending release for `index` and returns the new generation.
    fn supersede(&mut self, index: usize) -> u64 {
        if let Some(timer) = self.release_timers[index].take() {
            timer.abort();
        }
        self.generations[index] += 1;
        self.generations[index]
    }
}

/// Sole owner of the button state. Every mutation runs as one critical section
/// that ends with the full mask being pushed to the actuator.
pub struct ActuatorGateway {
    registry: Arc<CommandRegistry>,
    actuator: Arc<dyn Actuator>,
    holds: HoldTimings,
    bank: Mutex<ButtonBank>,
    events: broadcast::Sender<EngineEvent>,
}

impl ActuatorGateway {
    pub fn new(
        registry: Arc<CommandRegistry>,
        actuator: Arc<dyn Actuator>,
        holds: HoldTimings,
        events: broadcast::Sender<EngineEvent>,
    ) -> Arc<Self> {
        let bank = ButtonBank::new(registry.button_count());
        Arc::new(Self {
            registry,
            actuator,
            holds,
            bank: Mutex::new(bank),
            events,
        })
    }

    pub async fn set_button(&self, index: u8, pressed: bool) -> Result<(), ControlError> {
        let mut bank = self.bank.lock().await;
        self.write_locked(&mut bank, usize::from(index), pressed)
            .await
    }

    /// Presses the button for `token` and schedules its release. A press that
    /// lands while an earlier release is still pending replaces that release.
    pub async fn press_timed(self: &Arc<Self>, token: &str) -> Result<(), ControlError> {
        let command = self.registry.lookup(token)?;
        let index = usize::from(command.button);
        let hold = self.holds.duration(command.hold);

        let mut bank = self.bank.lock().await;
        let generation = bank.supersede(index);
        self.write_locked(&mut bank, index, true).await?;

        let gateway = Arc::clone(self);
        bank.release_timers[index] = Some(tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            gateway.release_if_current(index, generation).await;
        }));
        Ok(())
    }

    /// Presses, holds for the full duration, then releases before returning.
    pub async fn press_blocking(&self, token: &str) -> Result<(), ControlError> {
        let command = self.registry.lookup(token)?;
        let index = usize::from(command.button);
        {
            let mut bank = self.bank.lock().await;
            bank.supersede(index);
            self.write_locked(&mut bank, index, true).await?;
        }
        tokio::time::sleep(self.holds.duration(command.hold)).await;
        self.set_button(command.button, false).await
    }

    /// Cancels every pending release and lets go of all buttons.
    pub async fn reset(&self) -> Result<(), ControlError> {
        let mut bank = self.bank.lock().await;
        for index in 0..bank.pressed.len() {
            bank.supersede(index);
            bank.pressed[index] = false;
        }
        self.apply_locked(&bank).await
    }

    pub async fn bitmask(&self) -> u32 {
        self.bank.lock().await.bitmask()
    }

    async fn release_if_current(&self, index: usize, generation: u64) {
        let mut bank = self.bank.lock().await;
        if bank.generations[index] != generation {
            return;
        }
        bank.release_timers[index] = None;
        // Failures were already reported as a fault event.
        let _ = self.write_locked(&mut bank, index, false).await;
    }

    async fn write_locked(
        &self,
        bank: &mut ButtonBank,
        index: usize,
        pressed: bool,
    ) -> Result<(), ControlError> {
        let Some(slot) = bank.pressed.get_mut(index) else {
            return Err(ControlError::invalid_config(format!(
                "button {index} is outside the configured range"
            )));
        };
        *slot = pressed;
        let applied = self.apply_locked(bank).await;
        if applied.is_err() && pressed {
            // No release is armed for a press the device rejected.
            bank.pressed[index] = false;
        }
        applied
    }

    async fn apply_locked(&self, bank: &ButtonBank) -> Result<(), ControlError> {
        let mask = bank.bitmask();
        debug!(
            buttons = %render_bitmask(mask, self.registry.button_count()),
            "actuator: applying state"
        );
        self.actuator.apply_state(mask).await.map_err(|err| {
            let message = format!("{err:#}");
            error!(error = %message, "actuator: failed to apply state");
            let _ = self.events.send(EngineEvent::ActuatorFault {
                message: message.clone(),
            });
            ControlError::Actuator(message)
        })
    }
}

#[cfg(test)]
#[path = "tests/actuator_tests.rs"]
mod tests;
