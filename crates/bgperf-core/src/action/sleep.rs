use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::ActionOutcome;
use crate::latch::Latch;
use crate::telemetry::TelemetrySample;

/// Waits for at least `duration` of wall-clock time.
///
/// Completion is only noticed when the sequencer polls, so the real sleep is
/// rounded up to the next monitor sample.
#[derive(Debug)]
pub struct Sleep {
    duration: Duration,
    started: Instant,
    last_elapsed: Option<Duration>,
    latch: Latch,
    outcome: Option<ActionOutcome>,
}

impl Sleep {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started: Instant::now(),
            last_elapsed: None,
            latch: Latch::new(),
            outcome: None,
        }
    }

    pub fn notify(&mut self, sample: &TelemetrySample) {
        self.last_elapsed = Some(sample.elapsed);
    }

    pub fn has_finished(&mut self) -> bool {
        if self.latch.is_set() {
            return true;
        }
        let slept = self.started.elapsed();
        debug!(
            slept_secs = slept.as_secs(),
            of_secs = self.duration.as_secs_f64(),
            run_elapsed = ?self.last_elapsed,
            "sleep"
        );
        if slept >= self.duration && self.latch.set() {
            self.outcome = Some(ActionOutcome::Succeeded);
            return true;
        }
        false
    }

    pub fn outcome(&self) -> Option<&ActionOutcome> {
        self.outcome.as_ref()
    }

    pub fn abort(&mut self) {
        if self.latch.set() {
            self.outcome = Some(ActionOutcome::Failed {
                reason: "interrupted".into(),
            });
        }
    }
}
