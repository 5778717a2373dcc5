//! Boundary traits for the collaborators the control core drives but does not own.

use async_trait::async_trait;
use shared::domain::ChannelHandle;

/// Outbound half of a chat-platform connection.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, channel: &ChannelHandle, text: &str) -> anyhow::Result<()>;
}

/// The controller device. Receives the full button mask on every change.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn apply_state(&self, bitmask: u32) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    /// Each write replaces the previous contents.
    Replace,
    /// Each write is appended as a new line.
    Append,
}

/// Write-only text destination for status panels and event logs.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn write(&self, text: &str) -> anyhow::Result<()>;
}

pub struct NullChatSink;

#[async_trait]
impl ChatSink for NullChatSink {
    async fn send(&self, _channel: &ChannelHandle, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
