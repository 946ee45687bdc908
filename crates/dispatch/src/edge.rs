use std::time::{Duration, Instant};

use shared::domain::{ButtonDescriptor, ButtonId};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Pressed,
    Released,
}

/// Raw electrical transition, stamped by the hardware layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub kind: EdgeKind,
    pub at: Instant,
}

impl EdgeEvent {
    pub fn pressed(at: Instant) -> Self {
        Self {
            kind: EdgeKind::Pressed,
            at,
        }
    }

    pub fn released(at: Instant) -> Self {
        Self {
            kind: EdgeKind::Released,
            at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressEvent {
    pub button: ButtonId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldEvent {
    pub button: ButtonId,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Press(PressEvent),
    Hold(HoldEvent),
}

impl ButtonEvent {
    pub fn button(&self) -> ButtonId {
        match self {
            Self::Press(event) => event.button,
            Self::Hold(event) => event.button,
        }
    }
}

/// Turns one button's raw edges into at most one logical event per
/// press/release cycle.
///
/// Any edge closer than the debounce window to the last accepted edge is
/// discarded, whatever its kind. A tap released inside the window is
/// therefore noise and yields no event; the next accepted press starts a
/// fresh cycle.
#[derive(Debug)]
pub struct InputEdgeDetector {
    descriptor: ButtonDescriptor,
    hold_handler: bool,
    hold_start: Option<Instant>,
    last_accepted: Option<Instant>,
}

impl InputEdgeDetector {
    pub fn new(descriptor: ButtonDescriptor, hold_handler: bool) -> Self {
        Self {
            descriptor,
            hold_handler,
            hold_start: None,
            last_accepted: None,
        }
    }

    pub fn button(&self) -> ButtonId {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &ButtonDescriptor {
        &self.descriptor
    }

    pub fn on_edge(&mut self, edge: EdgeEvent) -> Option<ButtonEvent> {
        if let Some(last) = self.last_accepted {
            if edge.at.saturating_duration_since(last) < self.descriptor.debounce {
                trace!(button = %self.descriptor.id, kind = ?edge.kind, "edge discarded by debounce");
                return None;
            }
        }
        self.last_accepted = Some(edge.at);

        match edge.kind {
            EdgeKind::Pressed => {
                self.hold_start = Some(edge.at);
                trace!(button = %self.descriptor.id, "pressed");
                None
            }
            EdgeKind::Released => {
                let start = self.hold_start.take()?;
                let duration = edge.at.saturating_duration_since(start);
                debug!(
                    button = %self.descriptor.id,
                    held_ms = duration.as_millis() as u64,
                    "released"
                );
                Some(self.classify(duration))
            }
        }
    }

    fn classify(&self, duration: Duration) -> ButtonEvent {
        let button = self.descriptor.id;
        match self.descriptor.hold_threshold {
            Some(threshold) if self.hold_handler && duration >= threshold => {
                ButtonEvent::Hold(HoldEvent { button, duration })
            }
            _ => ButtonEvent::Press(PressEvent { button }),
        }
    }
}

#[cfg(test)]
#[path = "tests/edge_tests.rs"]
mod tests;
