use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("unknown command: {token}")]
    UnknownCommand { token: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("actuator unavailable: {0}")]
    Actuator(String),
    #[error("command scheduler is shut down")]
    SchedulerClosed,
}

impl ControlError {
    pub fn unknown_command(token: impl Into<String>) -> Self {
        Self::UnknownCommand {
            token: token.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
