use std::{
    fs,
    io::SeekFrom,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use integration::{SinkMode, StatusSink};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncSeekExt, AsyncWriteExt},
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};

enum SinkCommand {
    Write(String),
    Close(oneshot::Sender<()>),
}

/// Text file fed by a background writer task.
///
/// In [`SinkMode::Replace`] only the newest queued blob reaches the disk; in
/// [`SinkMode::Append`] every write lands as its own line, in order.
pub struct FileSink {
    path: PathBuf,
    commands: mpsc::UnboundedSender<SinkCommand>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl FileSink {
    pub async fn open(path: impl AsRef<Path>, mode: SinkMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir_exists(&path)?;

        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            SinkMode::Replace => options.write(true).truncate(true),
            SinkMode::Append => options.append(true),
        };
        let file = options
            .open(&path)
            .await
            .with_context(|| format!("failed to open sink file '{}'", path.display()))?;

        let (commands, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(file, mode, path.clone(), rx));
        Ok(Self {
            path,
            commands,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes everything queued so far and stops the writer.
    pub async fn close(&self) -> Result<()> {
        let Some(writer) = self.writer.lock().await.take() else {
            return Ok(());
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(SinkCommand::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        writer
            .await
            .with_context(|| format!("sink writer for '{}' panicked", self.path.display()))
    }
}

#[async_trait]
impl StatusSink for FileSink {
    async fn write(&self, text: &str) -> Result<()> {
        self.commands
            .send(SinkCommand::Write(text.to_string()))
            .map_err(|_| anyhow!("sink '{}' is closed", self.path.display()))
    }
}

async fn run_writer(
    mut file: File,
    mode: SinkMode,
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<SinkCommand>,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        let mut latest: Option<String> = None;
        let mut close_ack = None;
        for command in batch {
            let result = match command {
                SinkCommand::Write(text) => match mode {
                    SinkMode::Replace => {
                        latest = Some(text);
                        Ok(())
                    }
                    SinkMode::Append => append_line(&mut file, &text).await,
                },
                SinkCommand::Close(ack) => {
                    close_ack = Some(ack);
                    break;
                }
            };
            if let Err(error) = result {
                warn!(path = %path.display(), %error, "sink write failed");
            }
        }

        if let Some(text) = latest {
            if let Err(error) = replace_contents(&mut file, &text).await {
                warn!(path = %path.display(), %error, "sink write failed");
            }
        }
        if let Err(error) = file.flush().await {
            warn!(path = %path.display(), %error, "sink flush failed");
        }

        if let Some(ack) = close_ack {
            debug!(path = %path.display(), "sink closed");
            let _ = ack.send(());
            return;
        }
    }
}

async fn append_line(file: &mut File, text: &str) -> Result<()> {
    file.write_all(text.as_bytes()).await?;
    if !text.ends_with('\n') {
        file.write_all(b"\n").await?;
    }
    Ok(())
}

async fn replace_contents(file: &mut File, text: &str) -> Result<()> {
    truncate(file).await?;
    file.write_all(text.as_bytes()).await?;
    Ok(())
}

async fn truncate(file: &mut File) -> Result<()> {
    file.set_len(0).await?;
    file.seek(SeekFrom::Start(0)).await?;
    Ok(())
}

fn ensure_parent_dir_exists(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for sink '{}'",
            parent.display(),
            path.display()
        )
    })?;

    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
