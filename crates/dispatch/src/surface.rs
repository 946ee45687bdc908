//! Collaborator seams the core calls out through. Concrete implementations
//! live in the `display` and `hardware` crates.

use std::time::Duration;

use async_trait::async_trait;
use shared::{
    domain::{ButtonId, MenuId},
    error::{DisplayFault, InputFault},
};

use crate::edge::ButtonEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOption {
    pub button: ButtonId,
    pub label: String,
    pub description: String,
}

/// Everything a display needs to draw one menu's option list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub menu: MenuId,
    pub title: String,
    pub options: Vec<PromptOption>,
    pub timeout: Duration,
}

#[async_trait]
pub trait DisplaySurface: Send + Sync {
    async fn show_prompt(&self, prompt: &Prompt) -> Result<(), DisplayFault>;
    async fn show_default(&self) -> Result<(), DisplayFault>;
}

/// Operator-visible text stream (the control window).
pub trait Console: Send + Sync {
    fn emit(&self, line: &str);
}

pub trait Backlight: Send + Sync {
    /// Steps one level down, wrapping to full after off. Returns the new
    /// level as a percentage.
    fn step(&self) -> Result<u8, InputFault>;
    /// Remembers the current level and drives the panel to full brightness.
    fn hold_full(&self) -> Result<(), InputFault>;
    /// Returns to the level remembered by `hold_full`, if any.
    fn release_full(&self) -> Result<(), InputFault>;
    fn shutdown(&self);
}

/// The single entry point the hardware layer uses to hand logical button
/// events to the core.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: ButtonEvent);
}
