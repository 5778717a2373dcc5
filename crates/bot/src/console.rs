//! Stand-ins for the chat platform and the controller device: JSON lines on
//! stdin/stdout and a device that only logs.

use anyhow::Context;
use async_trait::async_trait;
use integration::{Actuator, ChatSink};
use shared::{
    domain::{render_bitmask, ChannelHandle},
    protocol::{ChatEvent, OutboundMessage},
};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use tracing::info;

/// Writes each outbound message as one JSON line.
pub struct ConsoleChat<W> {
    out: Mutex<W>,
}

impl ConsoleChat<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> ConsoleChat<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

#[async_trait]
impl<W> ChatSink for ConsoleChat<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, channel: &ChannelHandle, text: &str) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(&OutboundMessage {
            channel: channel.clone(),
            text: text.to_string(),
        })?;
        line.push('\n');

        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .context("failed to write chat message")?;
        out.flush().await?;
        Ok(())
    }
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_event(line: &str) -> anyhow::Result<Option<ChatEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let event = serde_json::from_str(line).context("malformed chat event")?;
    Ok(Some(event))
}

pub struct LoggingActuator {
    buttons: u8,
}

impl LoggingActuator {
    pub fn new(buttons: u8) -> Self {
        Self { buttons }
    }
}

#[async_trait]
impl Actuator for LoggingActuator {
    async fn apply_state(&self, bitmask: u32) -> anyhow::Result<()> {
        info!(
            buttons = %render_bitmask(bitmask, self.buttons),
            "device: state applied"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/console_tests.rs"]
mod tests;
