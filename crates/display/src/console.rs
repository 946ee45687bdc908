use std::io::{self, Write};

use dispatch::Console;
use tracing::debug;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// The control window is the daemon's own terminal, so operator text goes
/// straight to stdout.
#[derive(Debug, Default)]
pub struct TerminalConsole;

impl TerminalConsole {
    pub fn clear(&self) {
        let mut out = io::stdout().lock();
        if let Err(error) = out.write_all(CLEAR_SCREEN.as_bytes()).and_then(|()| out.flush()) {
            debug!(%error, "failed to clear control window");
        }
    }
}

impl Console for TerminalConsole {
    fn emit(&self, line: &str) {
        let mut out = io::stdout().lock();
        if let Err(error) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            debug!(%error, "failed to write to control window");
        }
    }
}
