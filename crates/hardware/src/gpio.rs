use std::{
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use dispatch::{EdgeEvent, EdgeKind, EventSink, InputEdgeDetector};
use futures::StreamExt;
use gpio_cdev::{AsyncLineEventHandle, Chip, EventRequestFlags, EventType, LineRequestFlags};
use shared::{domain::ButtonId, error::InputFault};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const CONSUMER: &str = "button-panel";

/// One physical button: where it is wired and how its edges are judged.
pub struct ButtonLine {
    pub pin: u32,
    /// Pulled up lines read low while pressed.
    pub pull_up: bool,
    pub detector: InputEdgeDetector,
}

/// Maps a kernel edge to a logical transition. Bias is set outside this
/// process (device tree or `pinctrl`), only the polarity is known here.
pub fn edge_kind(event: EventType, pull_up: bool) -> EdgeKind {
    match (event, pull_up) {
        (EventType::FallingEdge, true) | (EventType::RisingEdge, false) => EdgeKind::Pressed,
        (EventType::RisingEdge, true) | (EventType::FallingEdge, false) => EdgeKind::Released,
    }
}

/// Converts kernel event timestamps (nanoseconds) into `Instant`s anchored
/// at the first event seen, so bursts read from one buffer keep their real
/// spacing.
#[derive(Debug, Default)]
pub struct EdgeClock {
    anchor: Option<(Instant, u64)>,
}

impl EdgeClock {
    pub fn instant(&mut self, timestamp_ns: u64) -> Instant {
        match self.anchor {
            Some((base, base_ns)) if timestamp_ns >= base_ns => {
                base + Duration::from_nanos(timestamp_ns - base_ns)
            }
            _ => {
                // first event, or the kernel clock went backwards
                let now = Instant::now();
                self.anchor = Some((now, timestamp_ns));
                now
            }
        }
    }
}

/// Edge-watching tasks, one per requested line.
pub struct GpioInputs {
    tasks: Vec<JoinHandle<()>>,
}

impl GpioInputs {
    /// Requests every line up front so a wiring mistake fails startup, then
    /// spawns a task per line feeding `sink`.
    pub fn spawn(
        chip_path: &Path,
        lines: Vec<ButtonLine>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, InputFault> {
        let mut chip = Chip::new(chip_path).map_err(|error| InputFault::ChipUnavailable {
            chip: chip_path.display().to_string(),
            reason: error.to_string(),
        })?;

        let mut streams = Vec::with_capacity(lines.len());
        for line in lines {
            let button = line.detector.button();
            let request_fault = |reason: String| InputFault::LineRequest {
                button,
                pin: line.pin,
                reason,
            };
            let handle = chip
                .get_line(line.pin)
                .and_then(|gpio| {
                    gpio.events(
                        LineRequestFlags::INPUT,
                        EventRequestFlags::BOTH_EDGES,
                        CONSUMER,
                    )
                })
                .map_err(|error| request_fault(error.to_string()))?;
            let events =
                AsyncLineEventHandle::new(handle).map_err(|error| request_fault(error.to_string()))?;
            info!(%button, pin = line.pin, pull_up = line.pull_up, "button line requested");
            streams.push((line, events));
        }

        let tasks = streams
            .into_iter()
            .map(|(line, events)| tokio::spawn(watch(line, events, sink.clone())))
            .collect();
        Ok(Self { tasks })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stops every watcher. Dropping the event handles releases the lines.
    pub fn release(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(lines = self.tasks.len(), "button lines released");
    }
}

async fn watch(mut line: ButtonLine, mut events: AsyncLineEventHandle, sink: Arc<dyn EventSink>) {
    let button: ButtonId = line.detector.button();
    let mut clock = EdgeClock::default();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(error) => {
                error!(%button, %error, "failed to read gpio edge");
                break;
            }
        };
        let edge = EdgeEvent {
            kind: edge_kind(event.event_type(), line.pull_up),
            at: clock.instant(event.timestamp()),
        };
        debug!(%button, kind = ?edge.kind, "edge");
        if let Some(logical) = line.detector.on_edge(edge) {
            sink.deliver(logical);
        }
    }
    warn!(%button, "edge stream ended; button is no longer watched");
}

#[cfg(test)]
#[path = "tests/gpio_tests.rs"]
mod tests;
