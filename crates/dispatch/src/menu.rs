use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
    time::Duration,
};

use shared::domain::{ButtonId, MenuId, MenuSpec};
use tokio::{
    sync::{Mutex, MutexGuard},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    surface::{Console, DisplaySurface, Prompt, PromptOption},
    timer::ConfirmTimer,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuChoice {
    pub button: ButtonId,
    pub label: String,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    Armed,
    AlreadyArmed,
    /// The prompt could not be shown; the menu went straight back to idle.
    DisplayFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Selected(MenuChoice),
    NotAnOption,
    /// Nothing was pending, or the timeout won the race.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelReason {
    Operator,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Armed { started_at: Instant },
}

#[derive(Debug)]
struct ConfirmationSession {
    state: SessionState,
    generation: u64,
    timer: Option<ConfirmTimer>,
}

impl ConfirmationSession {
    fn is_armed(&self) -> bool {
        matches!(self.state, SessionState::Armed { .. })
    }

    /// Back to idle, aborting the pending timeout.
    fn clear(&mut self) {
        self.state = SessionState::Idle;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// Select-then-confirm state machine for one menu. Every transition goes
/// through the session lock, so a button press and the timeout can never
/// both leave the armed state.
pub struct MenuController {
    prompt: Prompt,
    choices: BTreeMap<ButtonId, MenuChoice>,
    settle: Duration,
    display: Arc<dyn DisplaySurface>,
    console: Arc<dyn Console>,
    session: Mutex<ConfirmationSession>,
}

impl MenuController {
    pub fn new(
        spec: &MenuSpec,
        timeout: Duration,
        settle: Duration,
        display: Arc<dyn DisplaySurface>,
        console: Arc<dyn Console>,
    ) -> Self {
        let prompt = Prompt {
            menu: spec.id.clone(),
            title: spec.title.clone(),
            options: spec
                .options
                .iter()
                .map(|option| PromptOption {
                    button: option.button,
                    label: option.label.clone(),
                    description: option.description.clone(),
                })
                .collect(),
            timeout,
        };
        let choices = spec
            .options
            .iter()
            .map(|option| {
                (
                    option.button,
                    MenuChoice {
                        button: option.button,
                        label: option.label.clone(),
                        action: option.action.clone(),
                    },
                )
            })
            .collect();

        Self {
            prompt,
            choices,
            settle,
            display,
            console,
            session: Mutex::new(ConfirmationSession {
                state: SessionState::Idle,
                generation: 0,
                timer: None,
            }),
        }
    }

    pub fn id(&self) -> &MenuId {
        &self.prompt.menu
    }

    pub async fn is_armed(&self) -> bool {
        self.session.lock().await.is_armed()
    }

    /// Shows the option list and starts the confirmation window. Callers
    /// are responsible for making sure no other menu is armed.
    pub async fn arm(self: &Arc<Self>) -> ArmOutcome {
        let mut session = self.session.lock().await;
        if session.is_armed() {
            return ArmOutcome::AlreadyArmed;
        }

        session.generation += 1;
        let generation = session.generation;
        session.state = SessionState::Armed {
            started_at: Instant::now(),
        };
        let menu: Weak<Self> = Arc::downgrade(self);
        let timer = ConfirmTimer::start(self.prompt.timeout, async move {
            if let Some(menu) = menu.upgrade() {
                menu.expire(generation).await;
            }
        });
        if let Some(stale) = session.timer.replace(timer) {
            stale.cancel();
        }
        info!(
            menu = %self.id(),
            timeout_secs = self.prompt.timeout.as_secs_f32(),
            "menu armed"
        );

        if let Err(fault) = self.display.show_prompt(&self.prompt).await {
            warn!(menu = %self.id(), %fault, "failed to show menu; cancelling");
            session.clear();
            drop(session);
            self.restore_default().await;
            return ArmOutcome::DisplayFailed;
        }
        ArmOutcome::Armed
    }

    /// Resolves a button press against the pending confirmation. Armed
    /// state is cleared before the choice is handed back, so the action
    /// runs with this menu already idle.
    pub async fn confirm(&self, button: ButtonId) -> Confirmation {
        let mut session = self.session.lock().await;
        let SessionState::Armed { started_at } = session.state else {
            return Confirmation::Idle;
        };
        let Some(choice) = self.choices.get(&button) else {
            return Confirmation::NotAnOption;
        };

        session.clear();
        info!(
            menu = %self.id(),
            %button,
            option = %choice.label,
            after_ms = started_at.elapsed().as_millis() as u64,
            "option selected"
        );
        self.console.emit(&format!("    {} selected", choice.label));
        Confirmation::Selected(choice.clone())
    }

    /// Returns to idle and restores the default view. No-op when idle.
    pub async fn cancel(&self) -> bool {
        let session = self.session.lock().await;
        if !session.is_armed() {
            return false;
        }
        self.finish_cancel(session, CancelReason::Operator).await;
        true
    }

    /// Drops any pending confirmation without touching the display.
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        if session.is_armed() {
            debug!(menu = %self.id(), "discarding pending confirmation");
        }
        session.clear();
    }

    async fn expire(&self, generation: u64) {
        let mut session = self.session.lock().await;
        if session.generation != generation || !session.is_armed() {
            return;
        }
        // Running inside the timer task: release, don't abort.
        if let Some(timer) = session.timer.take() {
            timer.release();
        }
        self.finish_cancel(session, CancelReason::Timeout).await;
    }

    /// Holds the session lock through the feedback pause so a new arm of
    /// this menu cannot interleave with the restore.
    async fn finish_cancel(
        &self,
        mut session: MutexGuard<'_, ConfirmationSession>,
        reason: CancelReason,
    ) {
        session.clear();
        let message = match reason {
            CancelReason::Operator => "Selection cancelled",
            CancelReason::Timeout => "Selection timed out",
        };
        info!(menu = %self.id(), ?reason, "confirmation cancelled");
        self.console.emit("");
        self.console.emit(&format!("    {message}"));
        tokio::time::sleep(self.settle).await;
        self.restore_default().await;
    }

    async fn restore_default(&self) {
        if let Err(fault) = self.display.show_default().await {
            warn!(menu = %self.id(), %fault, "failed to restore default view");
        }
    }
}

#[cfg(test)]
#[path = "tests/menu_tests.rs"]
mod tests;
