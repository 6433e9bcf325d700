use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::ActionOutcome;
use crate::bus::Publisher;
use crate::history::History;
use crate::latch::Latch;
use crate::sequencer::SequencerEvent;
use crate::telemetry::TelemetrySample;

/// Waits until the system under test is in a steady state: the last
/// `confidence` samples all show CPU at or below the threshold and at least
/// `min_routes` received routes.
///
/// Without a timeout the action waits forever if the thresholds are never
/// met.
#[derive(Debug)]
pub struct WaitConvergent {
    cpu_threshold: f64,
    min_routes: u64,
    history: History,
    timeout: Option<Duration>,
    started: Instant,
    publisher: Publisher,
    latch: Latch,
    outcome: Option<ActionOutcome>,
}

impl WaitConvergent {
    pub fn new(
        cpu_threshold: f64,
        min_routes: u64,
        confidence: usize,
        timeout: Option<Duration>,
        publisher: Publisher,
    ) -> Self {
        Self {
            cpu_threshold,
            min_routes,
            history: History::new(confidence),
            timeout,
            started: Instant::now(),
            publisher,
            latch: Latch::new(),
            outcome: None,
        }
    }

    pub fn notify(&mut self, sample: &TelemetrySample) {
        self.history.push(*sample);
    }

    pub fn has_finished(&mut self) -> bool {
        if self.latch.is_set() {
            return true;
        }

        if self.is_converged() && self.latch.set() {
            self.outcome = Some(ActionOutcome::Succeeded);
            self.publisher
                .sequencer(SequencerEvent::ExpectedPrefixes {
                    routes: self.min_routes,
                });
            info!(
                took_secs = self.started.elapsed().as_secs_f64(),
                routes = self.min_routes,
                "wait_convergent: steady state reached"
            );
            return true;
        }

        if let Some(timeout) = self.timeout {
            if self.started.elapsed() >= timeout && self.latch.set() {
                self.outcome = Some(ActionOutcome::Failed {
                    reason: format!(
                        "no convergence within {}s",
                        timeout.as_secs_f64()
                    ),
                });
                return true;
            }
        }

        false
    }

    /// Never true on a partial window.
    fn is_converged(&self) -> bool {
        if !self.history.is_full() {
            return false;
        }
        let converged = self.history.iter().all(|s| {
            s.cpu_percent <= self.cpu_threshold && s.received_routes >= self.min_routes
        });
        if converged {
            debug!(
                window = self.history.len(),
                "history indicates steady state of the bgpd under test"
            );
        }
        converged
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
