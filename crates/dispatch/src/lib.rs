//! Input-to-action dispatch core: debounced press/hold detection, the
//! select-then-confirm menu protocol, and the single-slot action runner.

pub mod edge;
pub mod menu;
pub mod router;
pub mod runner;
pub mod surface;
pub mod timer;

pub use edge::{ButtonEvent, EdgeEvent, EdgeKind, HoldEvent, InputEdgeDetector, PressEvent};
pub use menu::{ArmOutcome, Confirmation, MenuChoice, MenuController};
pub use router::{ArmRefusal, ChannelSink, DispatchRouter, RouteOutcome};
pub use runner::{ActionReport, ActionRunner, ActionSummary, CommandOutcome, RunPermit};
pub use surface::{Backlight, Console, DisplaySurface, EventSink, Prompt, PromptOption};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
