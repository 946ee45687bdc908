//! tmux-backed display: a dashboard window, a control window the daemon
//! writes into, and the prompt text drawn there.

pub mod console;
pub mod prompt;
pub mod tmux;

pub use console::TerminalConsole;
pub use prompt::render_prompt;
pub use tmux::{TmuxDisplay, TmuxLayout};
