use std::sync::Arc;

use anyhow::{Context, Result};
use dispatch::{
    ActionRunner, Backlight, ChannelSink, Console, DispatchRouter, DisplaySurface, MenuController,
};
use display::{TerminalConsole, TmuxDisplay, TmuxLayout};
use hardware::{ButtonLine, GpioInputs, PwmBacklight, SysfsPwm};
use settings::{BacklightSettings, DisplaySettings, Settings};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const EVENT_BUFFER: usize = 32;

/// Everything the daemon owns while running.
pub struct Panel {
    router: Arc<DispatchRouter>,
    inputs: GpioInputs,
    router_task: JoinHandle<()>,
}

impl Panel {
    /// Brings the panel up in dependency order: backlight, display (which
    /// must find its tmux session), router, then the button lines.
    pub async fn start(settings: &Settings) -> Result<Self> {
        let console = Arc::new(TerminalConsole);
        let backlight = open_backlight(&settings.backlight).await?;

        let mut display = TmuxDisplay::connect(layout(&settings.display), console.clone())
            .await
            .context("dashboard tmux session is not available")?;
        if let Some(backlight) = &backlight {
            display = display.with_backlight(backlight.clone());
        }

        let router = build_router(settings, Arc::new(display), console, backlight);
        let (sink, events) = ChannelSink::channel(EVENT_BUFFER);
        let lines = settings
            .buttons
            .iter()
            .map(|button| ButtonLine {
                pin: button.pin,
                pull_up: button.pull_up,
                detector: router.detector(button.descriptor()),
            })
            .collect();
        let inputs = GpioInputs::spawn(&settings.gpio.chip, lines, Arc::new(sink))
            .context("request button lines")?;

        let router = Arc::new(router);
        let router_task = tokio::spawn(router.clone().run(events));
        info!(buttons = inputs.len(), "button panel ready");
        Ok(Self {
            router,
            inputs,
            router_task,
        })
    }

    pub async fn stop(self) {
        self.inputs.release();
        self.router.shutdown().await;
        self.router_task.abort();
        info!("button panel stopped");
    }
}

/// Wires menus, actions and bindings from `settings` into a router.
pub fn build_router(
    settings: &Settings,
    display: Arc<dyn DisplaySurface>,
    console: Arc<dyn Console>,
    backlight: Option<Arc<dyn Backlight>>,
) -> DispatchRouter {
    let timeout = settings.timing.confirmation_timeout();
    let settle = settings.timing.settle_delay();

    let runner = ActionRunner::new(console.clone());
    let mut router = DispatchRouter::new(runner, display.clone(), console.clone(), settle);
    if let Some(backlight) = backlight {
        router = router.with_backlight(backlight);
    }

    for menu in &settings.menus {
        router.add_menu(MenuController::new(
            menu,
            timeout,
            settle,
            display.clone(),
            console.clone(),
        ));
    }
    for (name, action) in &settings.actions {
        router.add_action(name.clone(), action.clone());
    }
    for button in &settings.buttons {
        router.register(button.id, button.press.clone(), button.hold.clone());
    }
    router
}

async fn open_backlight(settings: &BacklightSettings) -> Result<Option<Arc<dyn Backlight>>> {
    if !settings.enabled {
        warn!("backlight control disabled");
        return Ok(None);
    }
    let backlight = PwmBacklight::connect(settings.retry_attempts, settings.gamma, || {
        SysfsPwm::open(&settings.pwm_chip, settings.channel, settings.period_ns)
    })
    .await
    .context("initialise backlight")?;
    let backlight: Arc<dyn Backlight> = Arc::new(backlight);
    Ok(Some(backlight))
}

fn layout(display: &DisplaySettings) -> TmuxLayout {
    TmuxLayout {
        session: display.session.clone(),
        dashboard_window: display.dashboard_window.clone(),
        control_window: display.control_window.clone(),
        dashboard_process: display.dashboard_process.clone(),
    }
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
