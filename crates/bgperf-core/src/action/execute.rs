use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use super::ActionOutcome;
use crate::latch::Latch;

/// Runs an external program and finishes once it has exited.
///
/// The program is spawned on construction; its exit status decides the
/// outcome. A program that cannot be started finishes as failed on the next
/// poll.
#[derive(Debug)]
pub struct ExecuteProgram {
    path: PathBuf,
    child: Option<Child>,
    spawn_error: Option<String>,
    latch: Latch,
    outcome: Option<ActionOutcome>,
}

impl ExecuteProgram {
    /// Must be called from within a Tokio runtime.
    pub fn new(path: PathBuf) -> Self {
        let spawned = Command::new(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            // stderr flows through so program diagnostics reach the terminal
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        let (child, spawn_error) = match spawned {
            Ok(child) => {
                info!(path = %path.display(), pid = ?child.id(), "program started");
                (Some(child), None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to start program");
                (None, Some(format!("failed to start '{}': {e}", path.display())))
            }
        };

        Self {
            path,
            child,
            spawn_error,
            latch: Latch::new(),
            outcome: None,
        }
    }

    pub fn has_finished(&mut self) -> bool {
        if self.latch.is_set() {
            return true;
        }

        let outcome = if let Some(reason) = self.spawn_error.take() {
            ActionOutcome::Failed { reason }
        } else {
            let Some(child) = self.child.as_mut() else {
                return false;
            };
            match child.try_wait() {
                Ok(None) => return false,
                Ok(Some(status)) if status.success() => ActionOutcome::Succeeded,
                Ok(Some(status)) => ActionOutcome::Failed {
                    reason: format!("'{}' exited with {status}", self.path.display()),
                },
                Err(e) => ActionOutcome::Failed {
                    reason: format!("failed to wait for '{}': {e}", self.path.display()),
                },
            }
        };

        self.latch.set();
        self.child = None;
        self.outcome = Some(outcome);
        true
    }

    pub fn outcome(&self) -> Option<&ActionOutcome> {
        self.outcome.as_ref()
    }

    /// Kill the program if it is still running.
    pub fn abort(&mut self) {
        if !self.latch.set() {
            return;
        }
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                warn!(path = %self.path.display(), error = %e, "failed to kill program");
            }
        }
        self.child = None;
        self.outcome = Some(ActionOutcome::Failed {
            reason: "interrupted".into(),
        });
    }
}
