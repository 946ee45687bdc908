use std::{collections::BTreeMap, sync::Arc, time::Duration};

use shared::{
    domain::{ActionSpec, Binding, ButtonDescriptor, ButtonId, MenuId},
    error::ActionFault,
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    edge::{ButtonEvent, HoldEvent, InputEdgeDetector, PressEvent},
    menu::{ArmOutcome, Confirmation, MenuController},
    runner::{ActionReport, ActionRunner},
    surface::{Backlight, Console, DisplaySurface, EventSink},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmRefusal {
    AnotherMenuArmed,
    ActionRunning,
    DisplayFailed,
    UnknownMenu,
}

/// What the router did with one logical event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Armed(MenuId),
    ArmRefused { menu: MenuId, reason: ArmRefusal },
    Cancelled(MenuId),
    ActionStarted(String),
    ActionRefused(String),
    BrightnessChanged(u8),
    DisplayRefreshed,
    Ignored,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Press,
    Hold,
}

#[derive(Debug, Clone, Default)]
struct ButtonBindings {
    press: Binding,
    hold: Option<Binding>,
}

/// Routes logical button events to menus and actions. The router is the
/// only component that arms a menu, and it never arms one while another is
/// armed or an action is running.
pub struct DispatchRouter {
    bindings: BTreeMap<ButtonId, ButtonBindings>,
    menus: Vec<Arc<MenuController>>,
    actions: BTreeMap<String, Arc<ActionSpec>>,
    runner: ActionRunner,
    display: Arc<dyn DisplaySurface>,
    console: Arc<dyn Console>,
    backlight: Option<Arc<dyn Backlight>>,
    settle: Duration,
    running: Mutex<Option<JoinHandle<ActionReport>>>,
}

impl DispatchRouter {
    pub fn new(
        runner: ActionRunner,
        display: Arc<dyn DisplaySurface>,
        console: Arc<dyn Console>,
        settle: Duration,
    ) -> Self {
        Self {
            bindings: BTreeMap::new(),
            menus: Vec::new(),
            actions: BTreeMap::new(),
            runner,
            display,
            console,
            backlight: None,
            settle,
            running: Mutex::new(None),
        }
    }

    pub fn with_backlight(mut self, backlight: Arc<dyn Backlight>) -> Self {
        self.backlight = Some(backlight);
        self
    }

    pub fn add_menu(&mut self, menu: MenuController) {
        self.menus.push(Arc::new(menu));
    }

    pub fn add_action(&mut self, name: impl Into<String>, action: ActionSpec) {
        self.actions.insert(name.into(), Arc::new(action));
    }

    pub fn register(&mut self, button: ButtonId, press: Binding, hold: Option<Binding>) {
        let hold = hold.filter(|binding| *binding != Binding::None);
        debug!(%button, ?press, ?hold, "button registered");
        self.bindings.insert(button, ButtonBindings { press, hold });
    }

    /// Builds the edge detector for a registered button. Holds are only
    /// classified for buttons with a hold binding.
    pub fn detector(&self, descriptor: ButtonDescriptor) -> InputEdgeDetector {
        let has_hold = self
            .bindings
            .get(&descriptor.id)
            .is_some_and(|bindings| bindings.hold.is_some());
        InputEdgeDetector::new(descriptor, has_hold)
    }

    pub fn runner(&self) -> &ActionRunner {
        &self.runner
    }

    pub async fn armed_menu(&self) -> Option<MenuId> {
        self.find_armed().await.map(|menu| menu.id().clone())
    }

    pub async fn dispatch(&self, event: ButtonEvent) -> RouteOutcome {
        match event {
            ButtonEvent::Press(press) => self.on_press_event(press).await,
            ButtonEvent::Hold(hold) => self.on_hold_event(hold).await,
        }
    }

    pub async fn on_press_event(&self, event: PressEvent) -> RouteOutcome {
        debug!(button = %event.button, "press");
        self.route(event.button, Trigger::Press).await
    }

    pub async fn on_hold_event(&self, event: HoldEvent) -> RouteOutcome {
        info!(
            button = %event.button,
            held_secs = event.duration.as_secs_f32(),
            "hold"
        );
        self.route(event.button, Trigger::Hold).await
    }

    /// Arms `menu` unless another menu is armed or an action is running.
    /// A refused request changes nothing and touches no display.
    pub async fn request_arm(&self, menu_id: &MenuId) -> RouteOutcome {
        let refused = |reason| RouteOutcome::ArmRefused {
            menu: menu_id.clone(),
            reason,
        };
        let Some(menu) = self.menus.iter().find(|menu| menu.id() == menu_id) else {
            warn!(menu = %menu_id, "arm requested for unknown menu");
            return refused(ArmRefusal::UnknownMenu);
        };
        if let Some(armed) = self.find_armed().await {
            debug!(menu = %menu_id, armed = %armed.id(), "arm refused; another menu is armed");
            return refused(ArmRefusal::AnotherMenuArmed);
        }
        if self.runner.is_busy() {
            info!(menu = %menu_id, "arm refused; an action is still running");
            return refused(ArmRefusal::ActionRunning);
        }

        match menu.arm().await {
            ArmOutcome::Armed => RouteOutcome::Armed(menu_id.clone()),
            ArmOutcome::AlreadyArmed => refused(ArmRefusal::AnotherMenuArmed),
            ArmOutcome::DisplayFailed => refused(ArmRefusal::DisplayFailed),
        }
    }

    /// Consumes events until every sender is gone.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ButtonEvent>) {
        while let Some(event) = events.recv().await {
            let outcome = self.dispatch(event).await;
            debug!(?outcome, "event routed");
        }
        info!("event channel closed; router stopping");
    }

    /// Waits for the most recently started action, if any.
    pub async fn wait_for_action(&self) -> Option<ActionReport> {
        let handle = self.running.lock().await.take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(error) => {
                error!(%error, "action task did not complete");
                None
            }
        }
    }

    /// Stops every confirmation timer and releases the backlight. A running
    /// action is left to finish on its own.
    pub async fn shutdown(&self) {
        for menu in &self.menus {
            menu.shutdown().await;
        }
        if let Some(handle) = self.running.lock().await.take() {
            if !handle.is_finished() {
                warn!("shutting down while an action is still running");
            }
        }
        if let Some(backlight) = &self.backlight {
            backlight.shutdown();
        }
        info!("dispatch core shut down");
    }

    async fn route(&self, button: ButtonId, trigger: Trigger) -> RouteOutcome {
        if let Some(menu) = self.find_armed().await {
            return self.resolve(&menu, button).await;
        }

        let Some(bindings) = self.bindings.get(&button) else {
            debug!(%button, "event from unregistered button");
            return RouteOutcome::Ignored;
        };
        let binding = match trigger {
            Trigger::Press => bindings.press.clone(),
            Trigger::Hold => bindings.hold.clone().unwrap_or_default(),
        };

        match binding {
            Binding::CycleBrightness => self.step_brightness(),
            Binding::RefreshDisplay => self.refresh_display().await,
            Binding::Arm(menu) => self.request_arm(&menu).await,
            Binding::Run(action) => self.launch(&action, false).await,
            Binding::None => RouteOutcome::Ignored,
        }
    }

    /// While a menu is armed every button feeds its confirmation: an option
    /// button confirms, anything else cancels and does nothing more.
    async fn resolve(&self, menu: &Arc<MenuController>, button: ButtonId) -> RouteOutcome {
        if !self.is_cancel_button(button) {
            match menu.confirm(button).await {
                Confirmation::Selected(choice) => return self.launch(&choice.action, true).await,
                Confirmation::Idle => return RouteOutcome::Ignored,
                Confirmation::NotAnOption => {}
            }
        }

        info!(menu = %menu.id(), %button, "cancelling pending confirmation");
        if menu.cancel().await {
            RouteOutcome::Cancelled(menu.id().clone())
        } else {
            RouteOutcome::Ignored
        }
    }

    fn is_cancel_button(&self, button: ButtonId) -> bool {
        self.bindings
            .get(&button)
            .is_some_and(|bindings| bindings.press == Binding::CycleBrightness)
    }

    async fn find_armed(&self) -> Option<Arc<MenuController>> {
        for menu in &self.menus {
            if menu.is_armed().await {
                return Some(menu.clone());
            }
        }
        None
    }

    fn step_brightness(&self) -> RouteOutcome {
        let Some(backlight) = &self.backlight else {
            debug!("no backlight configured");
            return RouteOutcome::Ignored;
        };
        match backlight.step() {
            Ok(level) => {
                info!(level, "brightness changed");
                RouteOutcome::BrightnessChanged(level)
            }
            Err(fault) => {
                error!(%fault, "failed to step brightness");
                RouteOutcome::Ignored
            }
        }
    }

    async fn refresh_display(&self) -> RouteOutcome {
        match self.display.show_default().await {
            Ok(()) => RouteOutcome::DisplayRefreshed,
            Err(fault) => {
                warn!(%fault, "display refresh failed");
                RouteOutcome::Ignored
            }
        }
    }

    async fn launch(&self, name: &str, from_menu: bool) -> RouteOutcome {
        let refused = || RouteOutcome::ActionRefused(name.to_string());
        let Some(action) = self.actions.get(name).cloned() else {
            let fault = ActionFault::Unknown(name.to_string());
            error!(%fault, "action refused");
            self.console.emit(&format!("    Error: {fault}"));
            if from_menu {
                self.restore_after_refusal().await;
            }
            return refused();
        };

        let permit = match self.runner.try_begin(&action.label) {
            Ok(permit) => permit,
            Err(fault) => {
                warn!(action = name, %fault, "action refused");
                self.console.emit(&format!("    {fault}"));
                if from_menu {
                    self.restore_after_refusal().await;
                }
                return refused();
            }
        };

        let display = self.display.clone();
        let settle = self.settle;
        let action_name = name.to_string();
        let handle = tokio::spawn(async move {
            let report = permit.run_action(&action).await;
            match &report.result {
                Ok(summary) => info!(action = %action_name, up_to_date = summary.up_to_date, "action finished"),
                Err(fault) => error!(
                    action = %action_name,
                    %fault,
                    stderr_lines = report.error_lines.len(),
                    "action failed"
                ),
            }
            if action.restore_display {
                tokio::time::sleep(settle).await;
                if let Err(fault) = display.show_default().await {
                    warn!(%fault, "failed to restore default view after action");
                }
            } else {
                info!(action = %action_name, "leaving display as is");
            }
            drop(permit);
            report
        });

        if let Some(previous) = self.running.lock().await.replace(handle) {
            if !previous.is_finished() {
                warn!("previous action handle replaced while still running");
            }
        }
        RouteOutcome::ActionStarted(name.to_string())
    }

    async fn restore_after_refusal(&self) {
        tokio::time::sleep(self.settle).await;
        if let Err(fault) = self.display.show_default().await {
            warn!(%fault, "failed to restore default view");
        }
    }
}

/// `EventSink` backed by the router's bounded event channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ButtonEvent>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ButtonEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, event: ButtonEvent) {
        if let Err(error) = self.tx.try_send(event) {
            warn!(button = %event.button(), %error, "dropping button event");
        }
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
