//! Panel configuration: the settings tree, the stock four-button layout and
//! layered loading from a TOML file plus `PANEL__*` environment overrides.

mod defaults;
mod validate;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{ActionSpec, Binding, ButtonDescriptor, ButtonId, MenuSpec},
    error::ConfigFault,
};
use tracing::{debug, info};

pub use validate::validate;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/button-panel/panel.toml";
pub const CONFIG_PATH_ENV: &str = "PANEL_CONFIG";
const ENV_PREFIX: &str = "PANEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gpio: GpioSettings,
    pub timing: TimingSettings,
    pub display: DisplaySettings,
    pub backlight: BacklightSettings,
    pub logging: LoggingSettings,
    pub buttons: Vec<ButtonSettings>,
    pub menus: Vec<MenuSpec>,
    pub actions: BTreeMap<String, ActionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioSettings {
    pub chip: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonSettings {
    pub id: ButtonId,
    pub pin: u32,
    #[serde(default = "default_true")]
    pub pull_up: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub hold_ms: Option<u64>,
    #[serde(default)]
    pub hold_repeat: bool,
    #[serde(default)]
    pub press: Binding,
    #[serde(default)]
    pub hold: Option<Binding>,
}

impl ButtonSettings {
    pub fn descriptor(&self) -> ButtonDescriptor {
        let descriptor = ButtonDescriptor::new(self.id, Duration::from_millis(self.debounce_ms));
        match self.hold_ms {
            Some(hold_ms) => descriptor.with_hold(Duration::from_millis(hold_ms), self.hold_repeat),
            None => descriptor,
        }
    }

    pub fn hold_binding(&self) -> Option<&Binding> {
        self.hold.as_ref().filter(|binding| **binding != Binding::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub confirmation_timeout_secs: u64,
    pub settle_delay_secs: u64,
}

impl TimingSettings {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub session: String,
    pub dashboard_window: String,
    pub control_window: String,
    /// Matched with `pgrep -f` under the dashboard pane to deliver redraws.
    pub dashboard_process: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklightSettings {
    pub enabled: bool,
    pub pwm_chip: PathBuf,
    pub channel: u32,
    pub period_ns: u64,
    pub gamma: f64,
    pub retry_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

/// The `[actions]` table read straight from the file. `config` lowercases
/// table keys, which would break mixed-case action names.
#[derive(Deserialize)]
struct FileActions {
    #[serde(default)]
    actions: Option<BTreeMap<String, ActionSpec>>,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    50
}

impl Settings {
    /// The button whose press cycles brightness. It may cancel a menu but
    /// never confirms one.
    pub fn brightness_button(&self) -> Option<ButtonId> {
        self.buttons
            .iter()
            .find(|button| button.press == Binding::CycleBrightness)
            .map(|button| button.id)
    }

    pub fn to_toml(&self) -> Result<String, ConfigFault> {
        toml::to_string_pretty(self).map_err(|error| ConfigFault::invalid(error.to_string()))
    }
}

/// Resolves the configuration file: an explicit path wins, then
/// `PANEL_CONFIG`, then the default path if it exists.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    default.exists().then_some(default)
}

/// Loads settings from `path` (if any) layered under `PANEL__*` environment
/// overrides, then validates them. Action names keep the case they have in
/// the file.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigFault> {
    let mut builder = Config::builder();
    let origin = match path {
        Some(path) => {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            path.display().to_string()
        }
        None => {
            info!("no configuration file; using the stock layout");
            "<defaults>".to_string()
        }
    };
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let load_fault = |error: config::ConfigError| ConfigFault::Load {
        path: origin.clone(),
        reason: error.to_string(),
    };
    let mut settings: Settings = builder
        .build()
        .map_err(load_fault)?
        .try_deserialize()
        .map_err(load_fault)?;

    if let Some(path) = path {
        if let Some(actions) = read_file_actions(path, &origin)? {
            settings.actions = actions;
        }
    }

    validate(&settings)?;
    debug!(
        source = %origin,
        buttons = settings.buttons.len(),
        menus = settings.menus.len(),
        actions = settings.actions.len(),
        "configuration loaded"
    );
    Ok(settings)
}

fn read_file_actions(
    path: &Path,
    origin: &str,
) -> Result<Option<BTreeMap<String, ActionSpec>>, ConfigFault> {
    let load_fault = |reason: String| ConfigFault::Load {
        path: origin.to_string(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|error| load_fault(error.to_string()))?;
    let file: FileActions = toml::from_str(&text).map_err(|error| load_fault(error.to_string()))?;
    Ok(file.actions)
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
