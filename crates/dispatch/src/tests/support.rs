//! Recording fakes for the display, console and backlight seams.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use shared::{
    domain::MenuId,
    error::{DisplayFault, InputFault},
};

use crate::surface::{Backlight, Console, DisplaySurface, Prompt};

#[derive(Default)]
pub struct RecordingConsole {
    lines: Mutex<Vec<String>>,
}

impl RecordingConsole {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("console lock").clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl Console for RecordingConsole {
    fn emit(&self, line: &str) {
        self.lines.lock().expect("console lock").push(line.to_string());
    }
}

#[derive(Default)]
pub struct RecordingDisplay {
    prompts: Mutex<Vec<MenuId>>,
    defaults: AtomicUsize,
    fail_prompts: AtomicBool,
}

impl RecordingDisplay {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let display = Self::default();
        display.fail_prompts.store(true, Ordering::SeqCst);
        Arc::new(display)
    }

    pub fn prompts(&self) -> Vec<MenuId> {
        self.prompts.lock().expect("display lock").clone()
    }

    pub fn defaults(&self) -> usize {
        self.defaults.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DisplaySurface for RecordingDisplay {
    async fn show_prompt(&self, prompt: &Prompt) -> Result<(), DisplayFault> {
        self.prompts
            .lock()
            .expect("display lock")
            .push(prompt.menu.clone());
        if self.fail_prompts.load(Ordering::SeqCst) {
            return Err(DisplayFault::WindowMissing("control".into()));
        }
        Ok(())
    }

    async fn show_default(&self) -> Result<(), DisplayFault> {
        self.defaults.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingBacklight {
    steps: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl RecordingBacklight {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl Backlight for RecordingBacklight {
    fn step(&self) -> Result<u8, InputFault> {
        let steps = self.steps.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(100 - ((steps % 11) as u8 * 10))
    }

    fn hold_full(&self) -> Result<(), InputFault> {
        Ok(())
    }

    fn release_full(&self) -> Result<(), InputFault> {
        Ok(())
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}
