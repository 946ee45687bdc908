use thiserror::Error;

use crate::domain::ButtonId;

/// Hardware initialisation faults. Fatal at startup.
#[derive(Debug, Error)]
pub enum InputFault {
    #[error("failed to open gpio chip {chip}: {reason}")]
    ChipUnavailable { chip: String, reason: String },
    #[error("failed to request pin {pin} for {button}: {reason}")]
    LineRequest {
        button: ButtonId,
        pin: u32,
        reason: String,
    },
    #[error("backlight pwm unavailable: {0}")]
    Pwm(String),
}

/// Display faults are never fatal once running; an armed menu that cannot
/// be shown is cancelled.
#[derive(Debug, Error)]
pub enum DisplayFault {
    #[error("tmux is not available: {0}")]
    TmuxUnavailable(String),
    #[error("tmux session '{0}' not found")]
    SessionMissing(String),
    #[error("tmux window '{0}' not found")]
    WindowMissing(String),
    #[error("failed to switch to window '{window}': {reason}")]
    SwitchFailed { window: String, reason: String },
}

/// External command faults. Reported to the operator, never propagated as a
/// crash.
#[derive(Debug, Error)]
pub enum ActionFault {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{label} exited with code {code}")]
    Failed { label: String, code: i32 },
    #[error("lost contact with {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("another action is still running; {0} was not started")]
    Busy(String),
    #[error("unknown action '{0}'")]
    Unknown(String),
}

impl ActionFault {
    /// True when the command never ran, as opposed to running and failing.
    pub fn is_start_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::Busy(_) | Self::Unknown(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigFault {
    #[error("failed to load configuration from {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigFault {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
