use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use engine::EngineConfig;
use serde::Deserialize;
use shared::domain::{ChannelHandle, CommandBinding, Identity, Mode};

const DEFAULT_CONFIG_FILE: &str = "bot.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bot_nick: String,
    pub channel: String,
    pub owner: String,
    /// Empty disables the prefix requirement.
    pub prefix: String,
    pub buttons: u8,
    pub commands: Vec<CommandBinding>,
    pub hold_short_ms: u64,
    pub hold_long_ms: u64,
    pub plan_size: usize,
    pub vote_open_secs: u64,
    pub vote_closing_secs: u64,
    pub mode_recheck_secs: u64,
    pub initial_mode: Mode,
    pub status_path: Option<PathBuf>,
    pub event_log_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let commands = [
            "a", "b", "x", "y", "up", "down", "left", "right", "start", "select",
        ]
        .iter()
        .enumerate()
        .map(|(button, token)| CommandBinding {
            token: token.to_string(),
            button: button as u8,
        })
        .collect();
        Self {
            bot_nick: "crowdbot".into(),
            channel: "stream".into(),
            owner: String::new(),
            prefix: "!".into(),
            buttons: 12,
            commands,
            hold_short_ms: 150,
            hold_long_ms: 500,
            plan_size: 3,
            vote_open_secs: 20,
            vote_closing_secs: 5,
            mode_recheck_secs: 30,
            initial_mode: Mode::Anarchy,
            status_path: None,
            event_log_path: None,
        }
    }
}

impl Settings {
    pub fn into_engine_config(self) -> anyhow::Result<EngineConfig> {
        let mut prefix_chars = self.prefix.chars();
        let prefix = match (prefix_chars.next(), prefix_chars.next()) {
            (None, _) => None,
            (Some(prefix), None) => Some(prefix),
            (Some(_), Some(_)) => bail!("prefix must be a single character, got '{}'", self.prefix),
        };
        if self.bot_nick.trim().is_empty() {
            bail!("bot_nick must not be empty");
        }

        Ok(EngineConfig {
            bot_identity: Identity::new(&self.bot_nick),
            owner: Identity::new(&self.owner),
            channel: ChannelHandle(self.channel),
            prefix,
            buttons: self.buttons,
            commands: self.commands,
            hold_short: Duration::from_millis(self.hold_short_ms),
            hold_long: Duration::from_millis(self.hold_long_ms),
            plan_size: self.plan_size,
            vote_open: Duration::from_secs(self.vote_open_secs),
            vote_closing: Duration::from_secs(self.vote_closing_secs),
            mode_recheck: Duration::from_secs(self.mode_recheck_secs),
            initial_mode: self.initial_mode,
        })
    }
}

/// Defaults, then the config file, then `APP__*` environment variables.
/// An explicitly named file must exist; the default `bot.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?;
            parse_settings(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?
        }
        None => match fs::read_to_string(DEFAULT_CONFIG_FILE) {
            Ok(raw) => parse_settings(&raw)
                .with_context(|| format!("invalid config file '{DEFAULT_CONFIG_FILE}'"))?,
            Err(_) => Settings::default(),
        },
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    Ok(toml::from_str(raw)?)
}

pub fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("APP__BOT_NICK") {
        settings.bot_nick = v;
    }
    if let Some(v) = lookup("APP__CHANNEL") {
        settings.channel = v;
    }
    if let Some(v) = lookup("APP__OWNER") {
        settings.owner = v;
    }
    if let Some(v) = lookup("APP__PREFIX") {
        settings.prefix = v;
    }
    if let Some(v) = lookup("APP__INITIAL_MODE") {
        settings.initial_mode = Mode::from_token(&v.trim().to_lowercase())
            .with_context(|| format!("APP__INITIAL_MODE: unknown mode '{v}'"))?;
    }
    if let Some(v) = lookup("APP__STATUS_PATH") {
        settings.status_path = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("APP__EVENT_LOG_PATH") {
        settings.event_log_path = Some(PathBuf::from(v));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
