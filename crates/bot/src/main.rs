use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use engine::ControlContext;
use integration::{SinkMode, StatusSink};
use sinks::FileSink;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod console;
mod monitor;

use config::load_settings;
use console::{parse_event, ConsoleChat, LoggingActuator};
use monitor::{spawn_monitor, Panels};

#[derive(Debug, Parser)]
#[command(about = "Lets a chat crowd drive a game controller by vote")]
struct Args {
    /// TOML settings file; defaults to ./bot.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries chat traffic, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = load_settings(args.config.as_deref())?;
    let status_sink = open_sink(settings.status_path.as_ref(), SinkMode::Replace).await?;
    let event_log = open_sink(settings.event_log_path.as_ref(), SinkMode::Append).await?;

    let config = settings.into_engine_config()?;
    info!(
        bot = %config.bot_identity,
        channel = %config.channel,
        "bot: starting"
    );
    let actuator = Arc::new(LoggingActuator::new(config.buttons));
    let context = ControlContext::start(config, actuator, Arc::new(ConsoleChat::stdout()))
        .await
        .context("failed to start controller")?;

    let mut monitor = spawn_monitor(
        Arc::clone(&context),
        Panels {
            status: status_sink.clone().map(|sink| sink as Arc<dyn StatusSink>),
            event_log: event_log.clone().map(|sink| sink as Arc<dyn StatusSink>),
        },
        context.subscribe_events(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => handle_line(&context, &line).await,
                    Ok(None) => {
                        info!("bot: chat input closed");
                        break Ok(());
                    }
                    Err(err) => {
                        break Err(anyhow::Error::new(err).context("failed to read chat input"))
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("bot: interrupted");
                break Ok(());
            }
            joined = &mut monitor => {
                break joined.context("monitor task panicked").and_then(|result| result);
            }
        }
    };

    if let Err(err) = &outcome {
        error!(error = %err, "bot: stopping on error");
    }
    monitor.abort();
    if let Err(err) = context.shutdown().await {
        warn!(error = %err, "bot: failed to release buttons");
    }
    for sink in [status_sink, event_log].into_iter().flatten() {
        if let Err(err) = sink.close().await {
            warn!(error = %err, path = %sink.path().display(), "bot: failed to close sink");
        }
    }
    outcome
}

async fn handle_line(context: &ControlContext, line: &str) {
    let event = match parse_event(line) {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "bot: skipping input line");
            return;
        }
    };
    if let Err(err) = context.handle_chat_event(event).await {
        warn!(error = %err, "bot: chat event not handled");
    }
}

async fn open_sink(
    path: Option<&PathBuf>,
    mode: SinkMode,
) -> anyhow::Result<Option<Arc<FileSink>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let sink = FileSink::open(path, mode)
        .await
        .with_context(|| format!("failed to open '{}'", path.display()))?;
    Ok(Some(Arc::new(sink)))
}
