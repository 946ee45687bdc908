use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use dispatch::Backlight;
use shared::error::InputFault;
use tracing::{debug, error, info, warn};

/// Brightness levels in percent, brightest first. Each press steps one
/// level down and wraps back to the top after off.
pub const BRIGHTNESS_LEVELS: [u8; 11] = [100, 90, 80, 70, 60, 50, 40, 30, 20, 10, 0];

const RETRY_PAUSE: Duration = Duration::from_millis(500);

/// Gamma-corrected 8-bit duty for a brightness percentage.
pub fn duty_for(level: u8, gamma: f64) -> u8 {
    if level == 0 {
        return 0;
    }
    let normalized = f64::from(level.min(100)) / 100.0;
    (normalized.powf(gamma) * 255.0).floor().clamp(0.0, 255.0) as u8
}

/// Something that can drive a duty cycle, 0 (off) to 255 (full).
pub trait PwmOutput: Send {
    fn set_duty(&mut self, duty: u8) -> Result<(), InputFault>;
}

/// One channel of a kernel PWM chip under `/sys/class/pwm`.
#[derive(Debug)]
pub struct SysfsPwm {
    channel_dir: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    pub fn open(chip: &Path, channel: u32, period_ns: u64) -> Result<Self, InputFault> {
        let channel_dir = chip.join(format!("pwm{channel}"));
        if !channel_dir.exists() {
            write_attr(&chip.join("export"), &channel.to_string())?;
        }
        let pwm = Self {
            channel_dir,
            period_ns,
        };
        pwm.write("period", &period_ns.to_string())?;
        pwm.write("enable", "1")?;
        debug!(dir = %pwm.channel_dir.display(), period_ns, "pwm channel enabled");
        Ok(pwm)
    }

    fn write(&self, attr: &str, value: &str) -> Result<(), InputFault> {
        write_attr(&self.channel_dir.join(attr), value)
    }
}

impl PwmOutput for SysfsPwm {
    fn set_duty(&mut self, duty: u8) -> Result<(), InputFault> {
        let duty_ns = self.period_ns * u64::from(duty) / 255;
        self.write("duty_cycle", &duty_ns.to_string())
    }
}

fn write_attr(path: &Path, value: &str) -> Result<(), InputFault> {
    fs::write(path, value)
        .map_err(|error| InputFault::Pwm(format!("writing {}: {error}", path.display())))
}

struct BacklightState<P> {
    output: P,
    step: usize,
    remembered: Option<usize>,
}

/// Stepped, gamma-corrected backlight over any `PwmOutput`.
pub struct PwmBacklight<P> {
    gamma: f64,
    state: Mutex<BacklightState<P>>,
}

impl<P: PwmOutput> PwmBacklight<P> {
    /// Takes ownership of `output` and drives it to full brightness.
    pub fn new(mut output: P, gamma: f64) -> Result<Self, InputFault> {
        output.set_duty(duty_for(BRIGHTNESS_LEVELS[0], gamma))?;
        Ok(Self {
            gamma,
            state: Mutex::new(BacklightState {
                output,
                step: 0,
                remembered: None,
            }),
        })
    }

    /// Retries `open` up to `attempts` times with a short pause between
    /// tries. PWM drivers are often still probing right after boot.
    pub async fn connect<F>(attempts: u32, gamma: f64, mut open: F) -> Result<Self, InputFault>
    where
        F: FnMut() -> Result<P, InputFault>,
    {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            info!(attempt, attempts, "initialising backlight pwm");
            match open().and_then(|output| Self::new(output, gamma)) {
                Ok(backlight) => return Ok(backlight),
                Err(fault) if attempt < attempts => {
                    warn!(attempt, %fault, "backlight pwm initialisation failed");
                    tokio::time::sleep(RETRY_PAUSE).await;
                    attempt += 1;
                }
                Err(fault) => {
                    error!(attempts, %fault, "giving up on backlight pwm");
                    return Err(InputFault::Pwm(format!(
                        "failed after {attempts} attempts: {fault}"
                    )));
                }
            }
        }
    }

    pub fn level(&self) -> Result<u8, InputFault> {
        let state = self.lock()?;
        Ok(BRIGHTNESS_LEVELS[state.step])
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BacklightState<P>>, InputFault> {
        self.state
            .lock()
            .map_err(|_| InputFault::Pwm("backlight state poisoned".into()))
    }

    fn apply(&self, state: &mut BacklightState<P>, step: usize) -> Result<(), InputFault> {
        let level = BRIGHTNESS_LEVELS[step];
        let duty = duty_for(level, self.gamma);
        state.output.set_duty(duty)?;
        state.step = step;
        debug!(level, duty, "backlight set");
        Ok(())
    }
}

impl<P: PwmOutput> Backlight for PwmBacklight<P> {
    fn step(&self) -> Result<u8, InputFault> {
        let mut state = self.lock()?;
        let next = (state.step + 1) % BRIGHTNESS_LEVELS.len();
        self.apply(&mut state, next)?;
        // a manual step outlives any pending restore
        state.remembered = None;
        Ok(BRIGHTNESS_LEVELS[next])
    }

    fn hold_full(&self) -> Result<(), InputFault> {
        let mut state = self.lock()?;
        // a second prompt must not overwrite the level from before the first
        if state.remembered.is_none() {
            state.remembered = Some(state.step);
        }
        self.apply(&mut state, 0)
    }

    fn release_full(&self) -> Result<(), InputFault> {
        let mut state = self.lock()?;
        match state.remembered.take() {
            Some(step) => self.apply(&mut state, step),
            None => Ok(()),
        }
    }

    fn shutdown(&self) {
        match self.lock() {
            Ok(mut state) => {
                if let Err(fault) = state.output.set_duty(0) {
                    error!(%fault, "failed to switch backlight off");
                } else {
                    info!("backlight off");
                }
            }
            Err(fault) => error!(%fault, "backlight unavailable at shutdown"),
        }
    }
}

#[cfg(test)]
#[path = "tests/backlight_tests.rs"]
mod tests;
