use std::sync::Arc;

use anyhow::anyhow;
use chrono::Local;
use engine::{status::describe_event, ControlContext};
use integration::StatusSink;
use shared::protocol::EngineEvent;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, warn};

/// Destinations for the status panel and the event log; either may be absent.
#[derive(Clone, Default)]
pub struct Panels {
    pub status: Option<Arc<dyn StatusSink>>,
    pub event_log: Option<Arc<dyn StatusSink>>,
}

/// Keeps the panels current and resolves with an error on the first
/// actuator fault.
pub fn spawn_monitor(
    context: Arc<ControlContext>,
    panels: Panels,
    mut events: broadcast::Receiver<EngineEvent>,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        refresh_status(&context, &panels).await;
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "monitor: lagging behind engine events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if let Some(log) = &panels.event_log {
                let line = format!(
                    "{} {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    describe_event(&event)
                );
                if let Err(err) = log.write(&line).await {
                    warn!(error = %err, "monitor: failed to append event log");
                }
            }
            refresh_status(&context, &panels).await;

            if let EngineEvent::ActuatorFault { message } = event {
                return Err(anyhow!("controller device failed: {message}"));
            }
        }
        debug!("monitor: event stream closed");
        Ok(())
    })
}

async fn refresh_status(context: &ControlContext, panels: &Panels) {
    let Some(status) = &panels.status else {
        return;
    };
    let rendered = context.status().await.render();
    if let Err(err) = status.write(&rendered).await {
        warn!(error = %err, "monitor: failed to write status panel");
    }
}

#[cfg(test)]
#[path = "tests/monitor_tests.rs"]
mod tests;
