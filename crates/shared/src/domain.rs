use std::{fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Logical button slot, numbered 1..=4 on the stock panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ButtonId(pub u8);

impl ButtonId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub fn is_valid_slot(self) -> bool {
        (Self::MIN..=Self::MAX).contains(&self.0)
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "button {}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuId(pub String);

impl MenuId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MenuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static description of one physical button. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonDescriptor {
    pub id: ButtonId,
    pub debounce: Duration,
    pub hold_threshold: Option<Duration>,
    /// Accepted for parity with the wiring file. Holds are classified on
    /// release, so a held button never produces more than one event.
    pub hold_repeat: bool,
}

impl ButtonDescriptor {
    pub fn new(id: ButtonId, debounce: Duration) -> Self {
        Self {
            id,
            debounce,
            hold_threshold: None,
            hold_repeat: false,
        }
    }

    pub fn with_hold(mut self, threshold: Duration, repeat: bool) -> Self {
        self.hold_threshold = Some(threshold);
        self.hold_repeat = repeat;
        self
    }
}

/// What a press or hold does while no menu is waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum Binding {
    /// Steps the backlight. The button carrying this binding cancels any
    /// pending confirmation instead.
    CycleBrightness,
    RefreshDisplay,
    Arm(MenuId),
    Run(String),
    #[default]
    None,
}

/// One external program invocation. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Command re-run after an action until the dependent service answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryProbe {
    pub command: CommandSpec,
    #[serde(default = "default_probe_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_probe_interval_ms")]
    pub interval_ms: u64,
}

impl RecoveryProbe {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_probe_max_wait_secs() -> u64 {
    30
}

fn default_probe_interval_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub label: String,
    pub steps: Vec<CommandSpec>,
    #[serde(default = "default_true")]
    pub restore_display: bool,
    #[serde(default)]
    pub recovery: Option<RecoveryProbe>,
    /// Output text meaning the action succeeded without changing anything.
    #[serde(default)]
    pub up_to_date_marker: Option<String>,
}

impl ActionSpec {
    pub fn single(label: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            label: label.into(),
            steps: vec![command],
            restore_display: true,
            recovery: None,
            up_to_date_marker: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOptionSpec {
    pub button: ButtonId,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSpec {
    pub id: MenuId,
    pub title: String,
    pub options: Vec<MenuOptionSpec>,
}

fn default_true() -> bool {
    true
}
