//! Scripted benchmark actions.
//!
//! Every action follows the same contract:
//!
//! - `notify(sample)` takes in one telemetry sample;
//! - `has_finished()` is idempotent. The call that first observes completion
//!   sets the action's [`Latch`](crate::latch::Latch) and performs the
//!   action's one-time side effects (publishing the prefix baseline, clearing
//!   an injected fault). Later calls just return `true`.
//!
//! The sequencer drives exactly one action at a time and drops it once it
//! has finished.

pub mod execute;
pub mod interrupt;
pub mod sleep;
pub mod wait_convergent;

pub use execute::ExecuteProgram;
pub use interrupt::InterruptPeers;
pub use sleep::Sleep;
pub use wait_convergent::WaitConvergent;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::Publisher;
use crate::fault::FaultInjector;
use crate::script::{ActionKind, ActionSpec};
use crate::telemetry::TelemetrySample;

// ---------------------------------------------------------------------------
// ActionOutcome
// ---------------------------------------------------------------------------

/// How a finished action ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Succeeded,
    /// Finished on its normal path, but something along the way went wrong
    /// (e.g. the fault could not be injected).
    Degraded { reason: String },
    Failed { reason: String },
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ActionOutcome::Failed { .. })
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Succeeded => f.write_str("succeeded"),
            ActionOutcome::Degraded { reason } => write!(f, "degraded: {reason}"),
            ActionOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionContext
// ---------------------------------------------------------------------------

/// Collaborators handed to every action at construction.
#[derive(Clone)]
pub struct ActionContext {
    pub publisher: Publisher,
    pub faults: Arc<dyn FaultInjector>,
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

pub enum Action {
    WaitConvergent(WaitConvergent),
    Sleep(Sleep),
    InterruptPeers(InterruptPeers),
    Execute(ExecuteProgram),
}

impl Action {
    /// Build the action for `spec`. Construction starts the action: faults
    /// are applied and programs spawned here.
    pub fn from_spec(spec: ActionSpec, ctx: &ActionContext) -> Self {
        match spec {
            ActionSpec::WaitConvergent {
                cpu_threshold,
                min_routes,
                confidence_count,
                timeout_seconds,
            } => Action::WaitConvergent(WaitConvergent::new(
                cpu_threshold,
                min_routes,
                confidence_count,
                timeout_seconds.map(Duration::from_secs_f64),
                ctx.publisher.clone(),
            )),
            ActionSpec::Sleep { duration_seconds } => {
                Action::Sleep(Sleep::new(Duration::from_secs_f64(duration_seconds)))
            }
            ActionSpec::InterruptPeers {
                peer_addresses,
                duration_seconds,
                recovery_seconds,
                loss_percent,
            } => Action::InterruptPeers(InterruptPeers::new(
                peer_addresses,
                Duration::from_secs_f64(duration_seconds),
                Duration::from_secs_f64(recovery_seconds),
                loss_percent,
                ctx,
            )),
            ActionSpec::Execute { path } => Action::Execute(ExecuteProgram::new(path)),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::WaitConvergent(_) => ActionKind::WaitConvergent,
            Action::Sleep(_) => ActionKind::Sleep,
            Action::InterruptPeers(_) => ActionKind::InterruptPeers,
            Action::Execute(_) => ActionKind::Execute,
        }
    }

    pub fn notify(&mut self, sample: &TelemetrySample) {
        match self {
            Action::WaitConvergent(a) => a.notify(sample),
            Action::Sleep(a) => a.notify(sample),
            Action::InterruptPeers(_) | Action::Execute(_) => {}
        }
    }

    pub fn has_finished(&mut self) -> bool {
        match self {
            Action::WaitConvergent(a) => a.has_finished(),
            Action::Sleep(a) => a.has_finished(),
            Action::InterruptPeers(a) => a.has_finished(),
            Action::Execute(a) => a.has_finished(),
        }
    }

    /// `Some` once the action has finished.
    pub fn outcome(&self) -> Option<&ActionOutcome> {
        match self {
            Action::WaitConvergent(a) => a.outcome(),
            Action::Sleep(a) => a.outcome(),
            Action::InterruptPeers(a) => a.outcome(),
            Action::Execute(a) => a.outcome(),
        }
    }

    /// Stop the action early, reverting anything it changed outside the
    /// process. A no-op for an action that already finished.
    pub fn abort(&mut self) {
        match self {
            Action::WaitConvergent(a) => a.abort(),
            Action::Sleep(a) => a.abort(),
            Action::InterruptPeers(a) => a.abort(),
            Action::Execute(a) => a.abort(),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("kind", &self.kind())
            .field("outcome", &self.outcome())
            .finish()
    }
}
