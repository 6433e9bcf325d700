//! Executes a [`Script`] one action at a time.
//!
//! The sequencer is owned by the main loop and advanced from inside its
//! dispatch of monitor samples: [`Sequencer::notify`] forwards the sample to
//! the active action and immediately asks it whether it has finished. When it
//! has, the sequencer publishes the result and starts the next entry. An
//! action's completion is therefore observed at the cadence of monitor
//! telemetry.
//!
//! Lifecycle events go out on the bus so the main loop sees them in order
//! with telemetry.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::action::{Action, ActionContext, ActionOutcome};
use crate::script::{ActionKind, Script};
use crate::telemetry::TelemetrySample;

// ---------------------------------------------------------------------------
// SequencerEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    /// A script entry was popped. `action` is the raw type tag.
    ActionStarted { action: String, at: Duration },
    ActionFinished {
        action: ActionKind,
        at: Duration,
        outcome: ActionOutcome,
    },
    /// Non-fatal problem inside a running action.
    ActionWarning { action: ActionKind, message: String },
    /// New expected-prefix baseline, published by `wait_convergent` on
    /// convergence.
    ExpectedPrefixes { routes: u64 },
    /// Fatal: the entry at `index` could not be executed. Nothing after it
    /// runs.
    ScriptAborted { index: usize, reason: String },
    ScriptComplete { at: Duration },
}

impl SequencerEvent {
    /// Free-text line for the operator.
    pub fn message(&self) -> String {
        match self {
            SequencerEvent::ActionStarted { action, at } => {
                format!("Action \"{action}\" started at {}", at.as_secs_f64())
            }
            SequencerEvent::ActionFinished {
                action,
                at,
                outcome,
            } => match outcome {
                ActionOutcome::Succeeded => {
                    format!("Action \"{action}\" finished at {}", at.as_secs_f64())
                }
                ActionOutcome::Degraded { reason } => format!(
                    "Action \"{action}\" finished at {} with warnings: {reason}",
                    at.as_secs_f64()
                ),
                ActionOutcome::Failed { reason } => format!(
                    "Action \"{action}\" FAILED at {}: {reason}",
                    at.as_secs_f64()
                ),
            },
            SequencerEvent::ActionWarning { action, message } => {
                format!("Action \"{action}\": {message}")
            }
            SequencerEvent::ExpectedPrefixes { routes } => {
                format!("Update maximum observed prefixes: {routes}")
            }
            SequencerEvent::ScriptAborted { index, reason } => {
                format!("Script aborted at entry {index}: {reason}")
            }
            SequencerEvent::ScriptComplete { at } => {
                format!("Script finished at {}", at.as_secs_f64())
            }
        }
    }

    pub fn expected_prefixes(&self) -> Option<u64> {
        match self {
            SequencerEvent::ExpectedPrefixes { routes } => Some(*routes),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SequencerEvent::ScriptAborted { .. })
    }

    pub fn is_warning(&self) -> bool {
        match self {
            SequencerEvent::ActionWarning { .. } => true,
            SequencerEvent::ActionFinished { outcome, .. } => {
                !matches!(outcome, ActionOutcome::Succeeded)
            }
            _ => false,
        }
    }
}

impl fmt::Display for SequencerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// `start` has not been called yet.
    Idle,
    Running,
    Complete,
    Aborted,
}

pub struct Sequencer {
    script: Script,
    active: Option<Action>,
    elapsed: Duration,
    state: SequencerState,
    ctx: ActionContext,
}

impl Sequencer {
    pub fn new(script: Script, ctx: ActionContext) -> Self {
        Self {
            script,
            active: None,
            elapsed: Duration::ZERO,
            state: SequencerState::Idle,
            ctx,
        }
    }

    /// Start the first script entry.
    pub fn start(&mut self) {
        if self.state != SequencerState::Idle {
            return;
        }
        info!(entries = self.script.len(), "starting sequencer");
        self.state = SequencerState::Running;
        self.advance();
    }

    /// Feed one monitor sample to the active action and advance the script
    /// if it finished.
    pub fn notify(&mut self, sample: &TelemetrySample) {
        self.elapsed = sample.elapsed;
        let Some(action) = self.active.as_mut() else {
            debug!(state = ?self.state, "sample received with no active action");
            return;
        };

        action.notify(sample);
        if !action.has_finished() {
            return;
        }

        let kind = action.kind();
        let outcome = action
            .outcome()
            .cloned()
            .unwrap_or(ActionOutcome::Succeeded);
        self.active = None;

        let event = SequencerEvent::ActionFinished {
            action: kind,
            at: self.elapsed,
            outcome,
        };
        info!("{event}");
        self.ctx.publisher.sequencer(event);
        self.advance();
    }

    /// Stop the run: revert the active action and drop the rest of the
    /// script. Safe to call in any state.
    pub fn abort(&mut self) {
        if let Some(mut action) = self.active.take() {
            info!(action = %action.kind(), "aborting active action");
            action.abort();
        }
        self.script.clear();
        if self.state != SequencerState::Complete {
            self.state = SequencerState::Aborted;
        }
    }

    fn advance(&mut self) {
        let Some(step) = self.script.pop() else {
            self.state = SequencerState::Complete;
            let event = SequencerEvent::ScriptComplete { at: self.elapsed };
            info!("{event}");
            self.ctx.publisher.sequencer(event);
            return;
        };

        self.ctx.publisher.sequencer(SequencerEvent::ActionStarted {
            action: step.kind.clone(),
            at: self.elapsed,
        });

        match step.spec {
            Ok(spec) => {
                info!(action = %step.kind, index = step.index, "action started");
                self.active = Some(Action::from_spec(spec, &self.ctx));
            }
            Err(e) => {
                error!(index = step.index, error = %e, "aborting script");
                self.script.clear();
                self.state = SequencerState::Aborted;
                self.ctx.publisher.sequencer(SequencerEvent::ScriptAborted {
                    index: step.index,
                    reason: e.to_string(),
                });
            }
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn active_kind(&self) -> Option<ActionKind> {
        self.active.as_ref().map(Action::kind)
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}
