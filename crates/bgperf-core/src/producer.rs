//! Telemetry producers: one task per probe, polling on a fixed interval and
//! publishing onto the bus.
//!
//! The interval is a sleep between polls, not a fixed-rate schedule, so
//! sampling drifts by however long each poll takes.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{BusMessage, Publisher};

/// A source of telemetry.
pub trait Probe: Send + 'static {
    type Error: Display + Send;

    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Take one reading. An error skips this tick only.
    fn poll(&mut self) -> impl Future<Output = Result<BusMessage, Self::Error>> + Send;
}

/// Running producer tasks, stopped together.
pub struct ProducerSet {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ProducerSet {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    /// Spawn a task polling `probe` every `interval`.
    pub fn spawn<P: Probe>(&mut self, probe: P, interval: Duration, publisher: Publisher) {
        info!(probe = probe.name(), interval_ms = interval.as_millis() as u64, "starting producer");
        let shutdown = self.shutdown.subscribe();
        self.handles
            .push(tokio::spawn(run(probe, interval, publisher, shutdown)));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every producer and wait for all of them to exit.
    pub async fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        let _ = self.shutdown.send(true);
        for result in join_all(self.handles.drain(..)).await {
            if let Err(e) = result {
                warn!(error = %e, "producer task panicked");
            }
        }
        debug!("all producers stopped");
    }
}

impl Default for ProducerSet {
    fn default() -> Self {
        Self::new()
    }
}

async fn run<P: Probe>(
    mut probe: P,
    interval: Duration,
    publisher: Publisher,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = probe.poll() => match result {
                Ok(msg) => {
                    if !publisher.publish(msg) {
                        debug!(probe = probe.name(), "bus closed");
                        break;
                    }
                }
                Err(e) => warn!(probe = probe.name(), error = %e, "poll failed; skipping tick"),
            },
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!(probe = probe.name(), "producer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus;
    use crate::telemetry::{MonitorSample, MonitorState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts polls; every third poll fails.
    struct CountingProbe {
        polls: Arc<AtomicUsize>,
    }

    impl Probe for CountingProbe {
        type Error = String;

        fn name(&self) -> &str {
            "counting"
        }

        async fn poll(&mut self) -> Result<BusMessage, String> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n % 3 == 0 {
                return Err(format!("poll {n} failed"));
            }
            Ok(BusMessage::Monitor(MonitorSample {
                state: MonitorState::Gobgp {
                    accepted: Some(n as u64),
                },
                checkpoint_hit: false,
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_interval_and_skips_failed_ticks() {
        let (publisher, mut rx) = bus::channel();
        let polls = Arc::new(AtomicUsize::new(0));
        let mut set = ProducerSet::new();
        set.spawn(
            CountingProbe {
                polls: polls.clone(),
            },
            Duration::from_secs(1),
            publisher,
        );

        let mut received = vec![];
        for _ in 0..4 {
            match rx.recv().await {
                Some(BusMessage::Monitor(m)) => received.push(m.state.received_routes()),
                other => panic!("unexpected {other:?}"),
            }
        }
        // poll 3 and 6 failed and produced nothing
        assert_eq!(received, vec![1, 2, 4, 5]);

        set.stop().await;
        assert!(set.is_empty());
        let after = polls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(polls.load(Ordering::SeqCst), after);
    }

    #[tokio::test(start_paused = true)]
    async fn producer_exits_when_bus_closes() {
        let (publisher, rx) = bus::channel();
        drop(rx);
        let mut set = ProducerSet::new();
        set.spawn(
            CountingProbe {
                polls: Arc::new(AtomicUsize::new(0)),
            },
            Duration::from_secs(1),
            publisher,
        );
        let handle = set.handles.pop().unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("producer should exit")
            .unwrap();
    }

    #[tokio::test]
    async fn stop_without_producers_returns() {
        let mut set = ProducerSet::new();
        set.stop().await;
        assert_eq!(set.len(), 0);
    }
}
