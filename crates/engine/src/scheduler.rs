use std::{collections::VecDeque, sync::Arc};

use shared::{error::ControlError, protocol::EngineEvent};
use tokio::{
    sync::{broadcast, Mutex, Notify},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{actuator::ActuatorGateway, registry::CommandRegistry};

#[derive(Default)]
struct Lanes {
    /// Lane A: single commands, pressed without waiting for release.
    immediate: VecDeque<String>,
    /// Lane B: plans, pressed strictly in order, one finished before the next.
    plans: VecDeque<Vec<String>>,
    sequential: bool,
    closed: bool,
}

enum Work {
    Command(String),
    Plan(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneDepths {
    pub immediate: usize,
    pub plans: usize,
}

pub struct CommandScheduler {
    registry: Arc<CommandRegistry>,
    gateway: Arc<ActuatorGateway>,
    lanes: Mutex<Lanes>,
    wake: Notify,
    events: broadcast::Sender<EngineEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CommandScheduler {
    /// Builds the scheduler and spawns its single worker.
    pub async fn start(
        registry: Arc<CommandRegistry>,
        gateway: Arc<ActuatorGateway>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Arc<Self> {
        let scheduler = Arc::new(Self {
            registry,
            gateway,
            lanes: Mutex::new(Lanes::default()),
            wake: Notify::new(),
            events,
            worker: Mutex::new(None),
        });
        let worker = tokio::spawn(Arc::clone(&scheduler).run());
        *scheduler.worker.lock().await = Some(worker);
        scheduler
    }

    pub async fn enqueue_command(&self, token: &str) -> Result<(), ControlError> {
        self.registry.lookup(token)?;
        {
            let mut lanes = self.lanes.lock().await;
            if lanes.closed {
                return Err(ControlError::SchedulerClosed);
            }
            lanes.immediate.push_back(token.to_string());
        }
        self.wake.notify_one();
        Ok(())
    }

    pub async fn enqueue_sequence(&self, tokens: Vec<String>) -> Result<(), ControlError> {
        for token in &tokens {
            self.registry.lookup(token)?;
        }
        {
            let mut lanes = self.lanes.lock().await;
            if lanes.closed {
                return Err(ControlError::SchedulerClosed);
            }
            lanes.plans.push_back(tokens);
        }
        self.wake.notify_one();
        Ok(())
    }

    /// Switching sequential mode off abandons every plan not yet started.
    pub async fn set_sequential_mode(&self, on: bool) {
        {
            let mut lanes = self.lanes.lock().await;
            lanes.sequential = on;
            if !on && !lanes.plans.is_empty() {
                info!(dropped = lanes.plans.len(), "scheduler: abandoning queued plans");
                lanes.plans.clear();
            }
        }
        self.wake.notify_one();
    }

    pub async fn is_sequential(&self) -> bool {
        self.lanes.lock().await.sequential
    }

    pub async fn depths(&self) -> LaneDepths {
        let lanes = self.lanes.lock().await;
        LaneDepths {
            immediate: lanes.immediate.len(),
            plans: lanes.plans.len(),
        }
    }

    /// Stops the worker after the item it is currently executing.
    pub async fn shutdown(&self) {
        {
            let mut lanes = self.lanes.lock().await;
            lanes.closed = true;
            lanes.immediate.clear();
            lanes.plans.clear();
        }
        self.wake.notify_one();
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(err) = worker.await {
                warn!(error = %err, "scheduler: worker ended abnormally");
            }
        }
    }

    async fn run(self: Arc<Self>) {
        while let Some(work) = self.next_work().await {
            match work {
                Work::Command(token) => match self.gateway.press_timed(&token).await {
                    Ok(()) => {
                        debug!(%token, "scheduler: pressed command");
                        let _ = self.events.send(EngineEvent::CommandPressed { token });
                    }
                    Err(err) => warn!(%token, error = %err, "scheduler: command press failed"),
                },
                Work::Plan(tokens) => {
                    info!(plan = ?tokens, "scheduler: executing plan");
                    let _ = self.events.send(EngineEvent::PlanStarted {
                        tokens: tokens.clone(),
                    });
                    for token in &tokens {
                        if let Err(err) = self.gateway.press_blocking(token).await {
                            warn!(
                                %token,
                                error = %err,
                                "scheduler: plan step failed; abandoning plan"
                            );
                            break;
                        }
                    }
                }
            }
        }
        debug!("scheduler: worker stopped");
    }

    /// Lane A always empties before Lane B is consulted.
    async fn next_work(&self) -> Option<Work> {
        loop {
            {
                let mut lanes = self.lanes.lock().await;
                if lanes.closed {
                    return None;
                }
                if let Some(token) = lanes.immediate.pop_front() {
                    return Some(Work::Command(token));
                }
                if lanes.sequential {
                    if let Some(plan) = lanes.plans.pop_front() {
                        return Some(Work::Plan(plan));
                    }
                }
            }
            self.wake.notified().await;
        }
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
