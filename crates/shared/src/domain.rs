use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound on addressable buttons; the actuator takes a 32-bit mask.
pub const MAX_BUTTONS: u8 = 32;

/// Case-insensitive chat identity. Always stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle(pub String);

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Anarchy,
    Democracy,
    Communism,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Anarchy, Mode::Democracy, Mode::Communism];

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "anarchy" => Some(Self::Anarchy),
            "democracy" => Some(Self::Democracy),
            "communism" => Some(Self::Communism),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Anarchy => "anarchy",
            Self::Democracy => "democracy",
            Self::Communism => "communism",
        }
    }

    /// Shape of the ballot collected while this mode governs.
    pub fn round_kind(self) -> Option<RoundKind> {
        match self {
            Self::Anarchy => None,
            Self::Democracy => Some(RoundKind::Single),
            Self::Communism => Some(RoundKind::Plan),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A voter's standing selection in the governance vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeVote {
    #[default]
    NoVote,
    Cast(Mode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldClass {
    Short,
    Long,
}

impl HoldClass {
    /// Single-character tokens are taps, everything else is held longer.
    pub fn for_token(token: &str) -> Self {
        if token.chars().count() == 1 {
            Self::Short
        } else {
            Self::Long
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    Single,
    Plan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBinding {
    pub token: String,
    pub button: u8,
}

/// Renders `mask` as a binary string, most significant button first.
pub fn render_bitmask(mask: u32, buttons: u8) -> String {
    let width = usize::from(buttons.min(MAX_BUTTONS));
    (0..width)
        .rev()
        .map(|bit| if mask & (1 << bit) != 0 { '1' } else { '0' })
        .collect()
}
