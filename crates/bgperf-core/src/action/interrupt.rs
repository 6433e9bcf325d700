use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ActionContext, ActionOutcome};
use crate::fault::FaultInjector;
use crate::latch::Latch;
use crate::script::ActionKind;
use crate::sequencer::SequencerEvent;

/// Injects packet loss toward a set of peers for `duration`, then waits a
/// further `recovery` before clearing the impairment and finishing.
///
/// The loss is applied on construction. If that fails the action still runs
/// on its timer, reports a warning, and still clears on completion so no
/// stale impairment is left behind.
pub struct InterruptPeers {
    peers: Vec<String>,
    duration: Duration,
    recovery: Duration,
    started: Instant,
    faults: Arc<dyn FaultInjector>,
    apply_error: Option<String>,
    latch: Latch,
    outcome: Option<ActionOutcome>,
}

impl InterruptPeers {
    pub fn new(
        peers: Vec<String>,
        duration: Duration,
        recovery: Duration,
        loss_percent: u8,
        ctx: &ActionContext,
    ) -> Self {
        let apply_error = match ctx.faults.apply(&peers, loss_percent) {
            Ok(()) => {
                info!(peers = ?peers, loss_percent, "packet loss applied");
                None
            }
            Err(e) => {
                warn!(
                    peers = ?peers,
                    error = %e,
                    "failed to apply packet loss; continuing on timer"
                );
                ctx.publisher.sequencer(SequencerEvent::ActionWarning {
                    action: ActionKind::InterruptPeers,
                    message: format!("fault injection failed: {e}"),
                });
                Some(e.to_string())
            }
        };

        Self {
            peers,
            duration,
            recovery,
            started: Instant::now(),
            faults: Arc::clone(&ctx.faults),
            apply_error,
            latch: Latch::new(),
            outcome: None,
        }
    }

    pub fn has_finished(&mut self) -> bool {
        if self.latch.is_set() {
            return true;
        }
        let total = self.duration + self.recovery;
        let elapsed = self.started.elapsed();
        debug!(
            elapsed_secs = elapsed.as_secs(),
            of_secs = total.as_secs_f64(),
            "interrupt_peers"
        );
        if elapsed < total || !self.latch.set() {
            return false;
        }

        let clear_error = self.revert();
        self.outcome = Some(match (self.apply_error.take(), clear_error) {
            (None, None) => ActionOutcome::Succeeded,
            (Some(apply), None) => ActionOutcome::Degraded {
                reason: format!("fault injection failed: {apply}"),
            },
            (apply, Some(clear)) => ActionOutcome::Degraded {
                reason: match apply {
                    Some(apply) => {
                        format!("fault injection failed: {apply}; clearing failed: {clear}")
                    }
                    None => format!("clearing failed: {clear}"),
                },
            },
        });
        true
    }

    fn revert(&self) -> Option<String> {
        match self.faults.clear() {
            Ok(()) => {
                info!(peers = ?self.peers, "packet loss cleared");
                None
            }
            Err(e) => {
                warn!(peers = ?self.peers, error = %e, "failed to clear packet loss");
                Some(e.to_string())
            }
        }
    }

    pub fn outcome(&self) -> Option<&ActionOutcome> {
        self.outcome.as_ref()
    }

    /// Clears the impairment unless the action already finished (and so
    /// already cleared it).
    pub fn abort(&mut self) {
        if !self.latch.set() {
            return;
        }
        let reason = match self.revert() {
            None => "interrupted".to_string(),
            Some(e) => format!("interrupted; clearing failed: {e}"),
        };
        self.outcome = Some(ActionOutcome::Failed { reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{self, BusMessage, Subscriber};
    use crate::fault::fake::{Call, RecordingInjector};

    fn start(
        injector: Arc<RecordingInjector>,
        duration: u64,
        recovery: u64,
    ) -> (InterruptPeers, Subscriber) {
        let (publisher, subscriber) = bus::channel();
        let ctx = ActionContext {
            publisher,
            faults: injector,
        };
        let a = InterruptPeers::new(
            vec!["10.10.0.3".into(), "10.10.0.4".into()],
            Duration::from_secs(duration),
            Duration::from_secs(recovery),
            60,
            &ctx,
        );
        (a, subscriber)
    }

    #[tokio::test(start_paused = true)]
    async fn applies_on_construction() {
        let injector = Arc::new(RecordingInjector::default());
        let (_a, _rx) = start(injector.clone(), 10, 0);
        assert_eq!(
            injector.calls(),
            vec![Call::Apply {
                peers: vec!["10.10.0.3".into(), "10.10.0.4".into()],
                loss: 60
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn clears_exactly_once_after_duration_plus_recovery() {
        let injector = Arc::new(RecordingInjector::default());
        let (mut a, _rx) = start(injector.clone(), 10, 5);

        for _ in 0..14 {
            tokio::time::advance(Duration::from_secs(1)).await;
            assert!(!a.has_finished());
            assert!(!a.has_finished());
        }
        assert_eq!(injector.clears(), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(a.has_finished());
        assert!(a.has_finished());
        a.abort();
        assert_eq!(injector.clears(), 1);
        assert_eq!(a.outcome(), Some(&ActionOutcome::Succeeded));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_apply_still_clears_and_reports_degraded() {
        let injector = Arc::new(RecordingInjector::failing());
        let (mut a, mut rx) = start(injector.clone(), 1, 0);

        assert!(matches!(
            rx.try_recv(),
            Some(BusMessage::Sequencer(SequencerEvent::ActionWarning {
                action: ActionKind::InterruptPeers,
                ..
            }))
        ));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(a.has_finished());
        assert_eq!(injector.clears(), 1);
        assert!(matches!(a.outcome(), Some(ActionOutcome::Degraded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_mid_fault_clears_once() {
        let injector = Arc::new(RecordingInjector::default());
        let (mut a, _rx) = start(injector.clone(), 60, 0);
        tokio::time::advance(Duration::from_secs(5)).await;
        a.abort();
        a.abort();
        assert!(a.has_finished());
        assert_eq!(injector.clears(), 1);
        assert!(a.outcome().is_some_and(|o| o.is_failure()));
    }
}
