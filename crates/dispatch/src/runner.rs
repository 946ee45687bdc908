use std::{io, process::Stdio, sync::Arc, time::Duration};

use shared::{
    domain::{ActionSpec, CommandSpec, RecoveryProbe},
    error::ActionFault,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    process::Command,
    sync::{Mutex, OwnedMutexGuard},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::surface::Console;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Exit status and captured output of one finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub output_lines: Vec<String>,
    pub error_lines: Vec<String>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of a whole action. The captured lines cover every step that
/// ran, including the one that failed.
#[derive(Debug)]
pub struct ActionReport {
    pub label: String,
    pub output_lines: Vec<String>,
    pub error_lines: Vec<String>,
    pub result: Result<ActionSummary, ActionFault>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSummary {
    pub up_to_date: bool,
    pub recovered: Option<bool>,
}

impl ActionReport {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs external commands one at a time. Clones share the same slot.
#[derive(Clone)]
pub struct ActionRunner {
    console: Arc<dyn Console>,
    slot: Arc<Mutex<()>>,
}

impl ActionRunner {
    pub fn new(console: Arc<dyn Console>) -> Self {
        Self {
            console,
            slot: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Claims the runner for one action. Fails instead of queueing when
    /// another action holds it.
    pub fn try_begin(&self, label: &str) -> Result<RunPermit, ActionFault> {
        let guard = self
            .slot
            .clone()
            .try_lock_owned()
            .map_err(|_| ActionFault::Busy(label.to_string()))?;
        Ok(RunPermit {
            _guard: guard,
            console: self.console.clone(),
        })
    }

    pub async fn execute(
        &self,
        command: &CommandSpec,
        label: &str,
    ) -> Result<CommandOutcome, ActionFault> {
        let permit = self.try_begin(label)?;
        permit.execute(command, label).await
    }
}

/// Proof of exclusive use of the runner. Dropping it frees the slot.
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
    console: Arc<dyn Console>,
}

impl RunPermit {
    pub async fn execute(
        &self,
        command: &CommandSpec,
        label: &str,
    ) -> Result<CommandOutcome, ActionFault> {
        info!(%label, %command, "starting command");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| {
            error!(%label, program = %command.program, %source, "failed to spawn command");
            ActionFault::Spawn {
                program: command.program.clone(),
                source,
            }
        })?;

        let io_fault = |source: io::Error| ActionFault::Io {
            program: command.program.clone(),
            source,
        };
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_fault(io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_fault(io::Error::other("stderr was not captured")))?;

        let mut stdout = Some(BufReader::new(stdout));
        let mut stderr = Some(BufReader::new(stderr));
        let (mut stdout_buf, mut stderr_buf) = (Vec::new(), Vec::new());
        let mut outcome = CommandOutcome::default();

        // A stream that fails to read is dropped; the child is still reaped.
        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                line = next_raw_line(&mut stdout, &mut stdout_buf), if stdout.is_some() => match line {
                    Ok(Some(line)) => {
                        self.console.emit(&format!("    {line}"));
                        outcome.output_lines.push(line);
                    }
                    Ok(None) => stdout = None,
                    Err(error) => {
                        warn!(%label, %error, "stopped reading stdout");
                        stdout = None;
                    }
                },
                line = next_raw_line(&mut stderr, &mut stderr_buf), if stderr.is_some() => match line {
                    Ok(Some(line)) => {
                        self.console.emit(&format!("    {line}"));
                        outcome.error_lines.push(line);
                    }
                    Ok(None) => stderr = None,
                    Err(error) => {
                        warn!(%label, %error, "stopped reading stderr");
                        stderr = None;
                    }
                },
            }
        }

        let status = child.wait().await.map_err(io_fault)?;
        outcome.exit_code = status.code().unwrap_or(-1);

        if outcome.success() {
            info!(%label, "command completed");
        } else {
            error!(%label, exit_code = outcome.exit_code, "command failed");
            for line in &outcome.error_lines {
                error!(%label, "{line}");
            }
        }
        Ok(outcome)
    }

    /// Runs every step of `action` in order, stopping at the first failure,
    /// and reports the result on the console.
    pub async fn run_action(&self, action: &ActionSpec) -> ActionReport {
        let label = action.label.clone();
        self.console.emit("");
        self.console.emit(&format!("    Running {label}..."));

        let mut output_lines = Vec::new();
        let mut error_lines = Vec::new();
        for step in &action.steps {
            match self.execute(step, &label).await {
                Ok(outcome) => {
                    let exit_code = outcome.exit_code;
                    output_lines.extend(outcome.output_lines);
                    error_lines.extend(outcome.error_lines);
                    if exit_code != 0 {
                        self.console.emit("");
                        self.console
                            .emit(&format!("    {label} failed (exit code {exit_code})"));
                        self.recover(action).await;
                        return ActionReport {
                            label: label.clone(),
                            output_lines,
                            error_lines,
                            result: Err(ActionFault::Failed {
                                label,
                                code: exit_code,
                            }),
                        };
                    }
                }
                Err(fault) => {
                    self.console.emit("");
                    if fault.is_start_failure() {
                        self.console
                            .emit(&format!("    Error: failed to start {label}: {fault}"));
                    } else {
                        self.console.emit(&format!("    Error: {label} aborted: {fault}"));
                    }
                    return ActionReport {
                        label,
                        output_lines,
                        error_lines,
                        result: Err(fault),
                    };
                }
            }
        }

        let up_to_date = action
            .up_to_date_marker
            .as_deref()
            .is_some_and(|marker| output_lines.iter().any(|line| line.contains(marker)));
        self.console.emit("");
        if up_to_date {
            info!(%label, "already up to date");
            self.console.emit(&format!("    {label} is already up to date"));
        } else {
            self.console
                .emit(&format!("    {label} completed successfully"));
        }

        let recovered = self.recover(action).await;
        ActionReport {
            label,
            output_lines,
            error_lines,
            result: Ok(ActionSummary {
                up_to_date,
                recovered,
            }),
        }
    }

    async fn recover(&self, action: &ActionSpec) -> Option<bool> {
        let probe = action.recovery.as_ref()?;
        Some(self.await_recovery(probe).await)
    }

    async fn await_recovery(&self, probe: &RecoveryProbe) -> bool {
        info!(probe = %probe.command, "waiting for service recovery");
        self.console.emit("");
        self.console.emit("    Waiting for service to restart...");

        let deadline = Instant::now() + probe.max_wait();
        while Instant::now() < deadline {
            match tokio::time::timeout(PROBE_TIMEOUT, probe_once(&probe.command)).await {
                Ok(true) => {
                    info!("service recovered");
                    self.console.emit("    Service is back online");
                    return true;
                }
                Ok(false) => debug!("service not ready yet"),
                Err(_) => debug!("recovery probe timed out"),
            }
            tokio::time::sleep(probe.interval()).await;
        }

        warn!(
            max_wait_secs = probe.max_wait_secs,
            "service did not recover in time"
        );
        self.console.emit("    Warning: service may still be restarting");
        false
    }
}

/// Reads one line, decoding invalid UTF-8 lossily. `buf` must outlive the
/// call so a line cut short by `select!` is resumed on the next call.
async fn next_raw_line<R>(reader: &mut Option<R>, buf: &mut Vec<u8>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let Some(reader) = reader.as_mut() else {
        return Ok(None);
    };
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    let line = String::from_utf8_lossy(&buf[..end]).into_owned();
    buf.clear();
    Ok(Some(line))
}

async fn probe_once(command: &CommandSpec) -> bool {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(cwd) = &command.cwd {
        cmd.current_dir(cwd);
    }
    match cmd.output().await {
        Ok(output) => {
            output.status.success() && !String::from_utf8_lossy(&output.stdout).trim().is_empty()
        }
        Err(error) => {
            debug!(%error, "recovery probe could not run");
            false
        }
    }
}

#[cfg(test)]
#[path = "tests/runner_tests.rs"]
mod tests;
