//! Shell command execution with a polled deadline.
//!
//! Queued-path only: a slow command can never stall the sensing loop, and a
//! runaway one is killed at the timeout rather than orphaned.

use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::action::{ActionCommand, ActionParams, ControllerKind};
use crate::config::ShellConfig;
use crate::controllers::{Controller, ControllerError};

/// Spawn `command_line` through the configured shell and wait for it,
/// polling `try_wait` against the deadline. On expiry the child is killed
/// and the timeout reported distinctly. Shared with the window controller.
pub(crate) fn run_with_timeout(
    shell: &str,
    command_line: &str,
    timeout: Duration,
) -> Result<String, ControllerError> {
    let mut child = Command::new(shell)
        .arg("-c")
        .arg(command_line)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ControllerError::Execution(format!("spawn failed: {}", e)))?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let output = child
                    .wait_with_output()
                    .map_err(|e| ControllerError::Execution(e.to_string()))?;
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if status.success() {
                    return Ok(stdout);
                }
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                return Err(ControllerError::Execution(if stderr.is_empty() {
                    format!("exit status {}", status)
                } else {
                    stderr
                }));
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ControllerError::Timeout {
                        seconds: timeout.as_secs(),
                    });
                }
                sleep(Duration::from_millis(25));
            }
            Err(e) => return Err(ControllerError::Execution(e.to_string())),
        }
    }
}

pub struct ShellController {
    cfg: ShellConfig,
}

impl ShellController {
    pub fn new(cfg: ShellConfig) -> Self {
        Self { cfg }
    }
}

impl Controller for ShellController {
    fn execute(
        &mut self,
        command: &ActionCommand,
        _params: &ActionParams,
    ) -> Result<String, ControllerError> {
        match command {
            ActionCommand::ShellRun(line) => {
                run_with_timeout(&self.cfg.shell, line, Duration::from_secs(self.cfg.timeout_secs))
            }
            _ => Err(ControllerError::Unsupported {
                kind: ControllerKind::Shell,
            }),
        }
    }
}
