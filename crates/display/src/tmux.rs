use std::{process::Output, sync::Arc};

use async_trait::async_trait;
use dispatch::{Backlight, Console, DisplaySurface, Prompt};
use shared::error::DisplayFault;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{console::TerminalConsole, prompt::render_prompt};

/// Where things live inside the tmux session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxLayout {
    pub session: String,
    pub dashboard_window: String,
    pub control_window: String,
    /// Process under the dashboard pane that redraws on `SIGWINCH`.
    pub dashboard_process: String,
}

/// Display surface that flips between the dashboard and control windows of
/// one tmux session.
pub struct TmuxDisplay {
    layout: TmuxLayout,
    console: Arc<TerminalConsole>,
    backlight: Option<Arc<dyn Backlight>>,
}

impl TmuxDisplay {
    /// Fails unless tmux runs and the session already exists. The daemon
    /// never creates the session itself.
    pub async fn connect(
        layout: TmuxLayout,
        console: Arc<TerminalConsole>,
    ) -> Result<Self, DisplayFault> {
        let version = Command::new("tmux")
            .arg("-V")
            .output()
            .await
            .map_err(|error| DisplayFault::TmuxUnavailable(error.to_string()))?;
        if !version.status.success() {
            return Err(DisplayFault::TmuxUnavailable(stderr_text(&version)));
        }
        debug!(version = %String::from_utf8_lossy(&version.stdout).trim(), "tmux available");

        let display = Self {
            layout,
            console,
            backlight: None,
        };
        if !display.has_session().await? {
            return Err(DisplayFault::SessionMissing(display.layout.session.clone()));
        }
        let session = &display.layout.session;
        info!(session = %session, "tmux session found");
        Ok(display)
    }

    pub fn with_backlight(mut self, backlight: Arc<dyn Backlight>) -> Self {
        self.backlight = Some(backlight);
        self
    }

    pub fn layout(&self) -> &TmuxLayout {
        &self.layout
    }

    pub async fn has_session(&self) -> Result<bool, DisplayFault> {
        let output = tmux(&["has-session", "-t", &self.layout.session]).await?;
        Ok(output.status.success())
    }

    /// Selects `window` and confirms tmux reports it as current.
    pub async fn switch_window(&self, window: &str) -> Result<(), DisplayFault> {
        let session = &self.layout.session;
        let listing = tmux(&["list-windows", "-t", session, "-F", "#W"]).await?;
        if !listing.status.success() || !window_listed(&String::from_utf8_lossy(&listing.stdout), window) {
            return Err(DisplayFault::WindowMissing(window.to_string()));
        }

        let target = format!("{session}:{window}");
        let switched = tmux(&["select-window", "-t", &target]).await?;
        if !switched.status.success() {
            return Err(DisplayFault::SwitchFailed {
                window: window.to_string(),
                reason: stderr_text(&switched),
            });
        }

        let current = tmux(&["display-message", "-p", "-t", session, "#W"]).await?;
        let current = String::from_utf8_lossy(&current.stdout);
        if current.trim() != window {
            return Err(DisplayFault::SwitchFailed {
                window: window.to_string(),
                reason: format!("tmux reports '{}' as current", current.trim()),
            });
        }
        debug!(%window, "switched window");
        Ok(())
    }

    /// Sends the dashboard a window-change signal so it redraws from
    /// scratch. Best effort.
    pub async fn redraw_dashboard(&self) {
        if let Err(reason) = self.signal_dashboard().await {
            debug!(%reason, "dashboard not signalled");
        }
    }

    async fn signal_dashboard(&self) -> Result<(), String> {
        let target = format!("{}:{}", self.layout.session, self.layout.dashboard_window);
        let panes = tmux(&["list-panes", "-t", &target, "-F", "#{pane_pid}"])
            .await
            .map_err(|fault| fault.to_string())?;
        let pane_pid = first_pid(&String::from_utf8_lossy(&panes.stdout))
            .ok_or_else(|| "no pane pid for the dashboard window".to_string())?;

        let children = Command::new("pgrep")
            .args(["-P", &pane_pid.to_string(), "-f", &self.layout.dashboard_process])
            .output()
            .await
            .map_err(|error| error.to_string())?;
        let pid = first_pid(&String::from_utf8_lossy(&children.stdout))
            .ok_or_else(|| format!("{} is not running", self.layout.dashboard_process))?;

        let status = Command::new("kill")
            .args(["-WINCH", &pid.to_string()])
            .status()
            .await
            .map_err(|error| error.to_string())?;
        if !status.success() {
            return Err(format!("kill -WINCH {pid} exited with {status}"));
        }
        debug!(pid, "sent SIGWINCH to dashboard");
        Ok(())
    }
}

#[async_trait]
impl DisplaySurface for TmuxDisplay {
    async fn show_prompt(&self, prompt: &Prompt) -> Result<(), DisplayFault> {
        self.switch_window(&self.layout.control_window).await?;
        if let Some(backlight) = &self.backlight {
            if let Err(fault) = backlight.hold_full() {
                warn!(%fault, "could not raise backlight for prompt");
            }
        }

        self.console.clear();
        for line in render_prompt(prompt) {
            self.console.emit(&line);
        }
        info!(menu = %prompt.menu, "prompt shown");
        Ok(())
    }

    async fn show_default(&self) -> Result<(), DisplayFault> {
        self.redraw_dashboard().await;
        let switched = self.switch_window(&self.layout.dashboard_window).await;
        // the remembered level comes back even when the switch failed
        if let Some(backlight) = &self.backlight {
            if let Err(fault) = backlight.release_full() {
                warn!(%fault, "could not restore backlight level");
            }
        }
        switched
    }
}

async fn tmux(args: &[&str]) -> Result<Output, DisplayFault> {
    debug!(?args, "tmux");
    Command::new("tmux")
        .args(args)
        .output()
        .await
        .map_err(|error| DisplayFault::TmuxUnavailable(error.to_string()))
}

fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// True if `window` is one of the names in a `list-windows -F '#W'` listing.
pub(crate) fn window_listed(listing: &str, window: &str) -> bool {
    listing.lines().any(|line| line.trim() == window)
}

pub(crate) fn first_pid(text: &str) -> Option<u32> {
    text.lines().find_map(|line| line.trim().parse().ok())
}

#[cfg(test)]
#[path = "tests/tmux_tests.rs"]
mod tests;
