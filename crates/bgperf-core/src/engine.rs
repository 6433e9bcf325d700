//! The main loop: consumes the bus, keeps the run's gauges, drives the
//! sequencer and decides when the run is over.
//!
//! Every exit path, whether cooldown, interrupt, script abort or a write
//! error, goes through the same teardown: the sequencer is aborted (which
//! reverts an in-flight fault), the producers are stopped and joined, and
//! the metrics log is flushed and closed.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::Local;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bus::{BusMessage, Subscriber};
use crate::checkpoint::Cooldown;
use crate::error::Result;
use crate::metrics::{format_bytes, MetricsLog, MetricsRow};
use crate::producer::ProducerSet;
use crate::sequencer::{Sequencer, SequencerEvent, SequencerState};
use crate::telemetry::{MonitorSample, ResourceSample, TelemetrySample};

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The cooldown after the last checkpoint elapsed.
    CooledDown,
    /// An external interrupt (SIGINT/SIGTERM) arrived.
    Interrupted,
    /// The script hit an entry it could not execute.
    Aborted { reason: String },
    /// Every publisher went away.
    BusClosed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::CooledDown => f.write_str("cooled down"),
            RunOutcome::Interrupted => f.write_str("interrupted"),
            RunOutcome::Aborted { reason } => write!(f, "script aborted: {reason}"),
            RunOutcome::BusClosed => f.write_str("telemetry stopped"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Monitor samples processed.
    pub samples: u64,
    pub max_prefixes: u64,
    /// Last baseline published by `wait_convergent`, 0 if none.
    pub expected_prefixes: u64,
    pub elapsed: Duration,
    /// Sequencer state at the moment the loop stopped; `None` without a
    /// script.
    pub script: Option<SequencerState>,
}

pub struct Engine {
    subscriber: Subscriber,
    sequencer: Option<Sequencer>,
    metrics: MetricsLog,
    producers: ProducerSet,
    cooldown: Cooldown,

    started: Instant,
    gauges: ResourceSample,
    samples: u64,
    max_prefixes: u64,
    expected_prefixes: u64,
    prefix_delta: i64,
}

impl Engine {
    pub fn new(
        subscriber: Subscriber,
        producers: ProducerSet,
        metrics: MetricsLog,
        cooling: u32,
    ) -> Self {
        Self {
            subscriber,
            sequencer: None,
            metrics,
            producers,
            cooldown: Cooldown::new(cooling),
            started: Instant::now(),
            gauges: ResourceSample::default(),
            samples: 0,
            max_prefixes: 0,
            expected_prefixes: 0,
            prefix_delta: 0,
        }
    }

    pub fn with_sequencer(mut self, sequencer: Sequencer) -> Self {
        self.sequencer = Some(sequencer);
        self
    }

    /// Run until the cooldown elapses, `interrupt` resolves, the script
    /// aborts or the bus closes.
    pub async fn run(mut self, interrupt: impl Future<Output = ()>) -> Result<RunSummary> {
        self.started = Instant::now();
        if let Some(seq) = self.sequencer.as_mut() {
            seq.start();
        }

        let result = self.drive(interrupt).await;
        let script = self.sequencer.as_ref().map(Sequencer::state);
        let teardown = self.shutdown().await;

        let outcome = result?;
        teardown?;
        info!(outcome = %outcome, samples = self.samples, "benchmark finished");
        Ok(RunSummary {
            outcome,
            samples: self.samples,
            max_prefixes: self.max_prefixes,
            expected_prefixes: self.expected_prefixes,
            elapsed: self.started.elapsed(),
            script,
        })
    }

    async fn drive(&mut self, interrupt: impl Future<Output = ()>) -> Result<RunOutcome> {
        tokio::pin!(interrupt);
        loop {
            let msg = tokio::select! {
                biased;
                _ = &mut interrupt => {
                    warn!("interrupt received, shutting down");
                    return Ok(RunOutcome::Interrupted);
                }
                msg = self.subscriber.recv() => msg,
            };
            let Some(msg) = msg else {
                warn!("all telemetry publishers are gone");
                return Ok(RunOutcome::BusClosed);
            };
            if let Some(outcome) = self.dispatch(msg)? {
                return Ok(outcome);
            }
        }
    }

    fn dispatch(&mut self, msg: BusMessage) -> Result<Option<RunOutcome>> {
        match msg {
            BusMessage::Target(sample) => {
                debug!(cpu = sample.cpu_percent, mem = sample.mem_bytes, "target sample");
                self.gauges = sample;
                Ok(None)
            }
            BusMessage::Monitor(sample) => self.on_monitor(sample),
            BusMessage::Sequencer(event) => Ok(self.on_sequencer(event)),
        }
    }

    fn on_monitor(&mut self, sample: MonitorSample) -> Result<Option<RunOutcome>> {
        let now = Local::now();
        let elapsed = self.started.elapsed();
        let received = sample.state.received_routes();
        let networks = sample.state.unique_networks();
        self.samples += 1;

        self.max_prefixes = self.max_prefixes.max(received);
        if self.expected_prefixes > 0 {
            self.prefix_delta = self.expected_prefixes as i64 - received as i64;
        }

        info!(
            "elapsed: {:.3} sec, cpu: {:>4.2}%, mem: {}, routes: {}, max_prefixes: {}, delta: {}",
            elapsed.as_secs_f64(),
            self.gauges.cpu_percent,
            format_bytes(self.gauges.mem_bytes),
            received,
            self.max_prefixes,
            self.prefix_delta,
        );
        if self.prefix_delta < 0 {
            warn!(
                delta = self.prefix_delta,
                "negative prefix delta: the route count given to wait_convergent is too low"
            );
        }

        if let Some(seq) = self.sequencer.as_mut() {
            seq.notify(&TelemetrySample {
                elapsed,
                cpu_percent: self.gauges.cpu_percent,
                mem_bytes: self.gauges.mem_bytes,
                received_routes: received,
            });
        }

        self.metrics.write_row(&MetricsRow {
            elapsed,
            cpu_percent: self.gauges.cpu_percent,
            mem_bytes: self.gauges.mem_bytes,
            unique_networks: networks,
            received_routes: received,
            prefix_delta: self.prefix_delta,
            time: now,
            core_frequencies: &self.gauges.core_frequencies,
        })?;

        if sample.checkpoint_hit {
            info!(routes = received, "checkpoint reached");
        }
        if self.cooldown.observe(sample.checkpoint_hit) {
            info!(cooling = self.cooldown.length(), "cooldown elapsed");
            return Ok(Some(RunOutcome::CooledDown));
        }
        Ok(None)
    }

    fn on_sequencer(&mut self, event: SequencerEvent) -> Option<RunOutcome> {
        if event.is_fatal() {
            error!("{event}");
        } else if event.is_warning() {
            warn!("{event}");
        } else {
            info!("{event}");
        }

        match event {
            SequencerEvent::ExpectedPrefixes { routes } => {
                self.expected_prefixes = routes;
                None
            }
            SequencerEvent::ScriptAborted { reason, .. } => Some(RunOutcome::Aborted { reason }),
            _ => None,
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Some(seq) = self.sequencer.as_mut() {
            seq.abort();
        }
        self.producers.stop().await;
        self.metrics.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionContext;
    use crate::bus::{self, Publisher};
    use crate::fault::fake::{Call, RecordingInjector};
    use crate::script::Script;
    use crate::telemetry::MonitorState;
    use std::sync::Arc;

    fn monitor(routes: u64, hit: bool) -> BusMessage {
        BusMessage::Monitor(MonitorSample {
            state: MonitorState::Bird {
                routes_matching: routes,
                routes_all: routes,
                unique_networks: routes / 2,
            },
            checkpoint_hit: hit,
        })
    }

    fn target(cpu: f64) -> BusMessage {
        BusMessage::Target(ResourceSample {
            cpu_percent: cpu,
            mem_bytes: 1000,
            core_frequencies: vec![],
        })
    }

    fn sequencer(yaml: &str, publisher: &Publisher, injector: Arc<RecordingInjector>) -> Sequencer {
        Sequencer::new(
            Script::from_yaml(yaml).unwrap(),
            ActionContext {
                publisher: publisher.clone(),
                faults: injector,
            },
        )
    }

    #[tokio::test]
    async fn terminates_after_cooldown_and_writes_one_row_per_monitor_sample() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let (publisher, subscriber) = bus::channel();

        for msg in [
            target(5.0),
            monitor(10, false),
            monitor(100, true),
            target(3.0),
            monitor(100, false),
            monitor(100, false),
            monitor(100, false),
            monitor(100, false),
        ] {
            publisher.publish(msg);
        }

        let metrics = MetricsLog::create(&path, &[]).unwrap();
        let engine = Engine::new(subscriber, ProducerSet::new(), metrics, 2);
        let summary = engine.run(std::future::pending()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::CooledDown);
        assert_eq!(summary.samples, 4);
        assert_eq!(summary.max_prefixes, 100);
        assert_eq!(summary.script, None);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().nth(1).unwrap().starts_with("0."));
        assert!(text.lines().nth(4).unwrap().contains(", 3.00, 1000, 50, 100, 0, "));
    }

    #[tokio::test(start_paused = true)]
    async fn baseline_from_wait_convergent_sets_prefix_delta() {
        let (publisher, subscriber) = bus::channel();
        let injector = Arc::new(RecordingInjector::default());
        let seq = sequencer(
            "script:\n  - action: {type: wait_convergent, cpu_below: 10, routes: 100, confidence: 1}\n",
            &publisher,
            injector,
        );
        // one message per second so sequencer events interleave like a real run
        tokio::spawn(async move {
            for msg in [
                target(1.0),
                monitor(120, false),
                monitor(90, true),
                monitor(90, false),
            ] {
                publisher.publish(msg);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });

        let summary = Engine::new(subscriber, ProducerSet::new(), MetricsLog::disabled(), 1)
            .with_sequencer(seq)
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::CooledDown);
        assert_eq!(summary.expected_prefixes, 100);
        assert_eq!(summary.max_prefixes, 120);
        assert_eq!(summary.script, Some(SequencerState::Complete));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_mid_fault_clears_before_returning() {
        let (publisher, subscriber) = bus::channel();
        let injector = Arc::new(RecordingInjector::default());
        let seq = sequencer(
            "script:\n  - action: {type: interrupt_peers, peers: [10.10.0.3], duration: 600}\n",
            &publisher,
            injector.clone(),
        );
        publisher.publish(monitor(10, false));

        let summary = Engine::new(subscriber, ProducerSet::new(), MetricsLog::disabled(), 0)
            .with_sequencer(seq)
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Interrupted);
        assert_eq!(summary.samples, 1);
        assert_eq!(injector.clears(), 1);
        assert_eq!(summary.script, Some(SequencerState::Running));
    }

    #[tokio::test]
    async fn interrupt_pending_at_start_still_clears_the_first_fault() {
        let (publisher, subscriber) = bus::channel();
        let injector = Arc::new(RecordingInjector::default());
        let seq = sequencer(
            "script:\n  - action: {type: interrupt_peers, peers: [10.10.0.3], duration: 600}\n",
            &publisher,
            injector.clone(),
        );

        let summary = Engine::new(subscriber, ProducerSet::new(), MetricsLog::disabled(), 0)
            .with_sequencer(seq)
            .run(std::future::ready(()))
            .await
            .unwrap();

        assert_eq!(summary.outcome, RunOutcome::Interrupted);
        assert_eq!(summary.samples, 0);
        assert_eq!(
            injector.calls(),
            vec![
                Call::Apply {
                    peers: vec!["10.10.0.3".into()],
                    loss: 100
                },
                Call::Clear
            ]
        );
    }

    #[tokio::test]
    async fn rows_before_first_target_sample_have_empty_frequency_cells() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let (publisher, subscriber) = bus::channel();

        publisher.publish(monitor(10, false));
        publisher.publish(target(5.0));
        publisher.publish(monitor(10, true));

        let metrics = MetricsLog::create(&path, &[2, 3]).unwrap();
        let summary = Engine::new(subscriber, ProducerSet::new(), metrics, 0)
            .run(std::future::pending())
            .await
            .unwrap();
        assert_eq!(summary.outcome, RunOutcome::CooledDown);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        for line in text.lines() {
            assert_eq!(line.split(',').count(), 9, "ragged row: {line}");
        }
    }

    #[tokio::test]
    async fn unknown_action_aborts_the_run() {
        let (publisher, subscriber) = bus::channel();
        let injector = Arc::new(RecordingInjector::default());
        let seq = sequencer(
            "script:\n  - action: {type: bogus}\n  - action: {type: interrupt_peers, peers: [10.0.0.1], duration: 1}\n",
            &publisher,
            injector.clone(),
        );

        let summary = Engine::new(subscriber, ProducerSet::new(), MetricsLog::disabled(), 0)
            .with_sequencer(seq)
            .run(std::future::pending())
            .await
            .unwrap();

        match summary.outcome {
            RunOutcome::Aborted { reason } => assert!(reason.contains("bogus"), "got {reason}"),
            other => panic!("expected abort, got {other:?}"),
        }
        assert!(injector.calls().is_empty());
        assert_eq!(summary.script, Some(SequencerState::Aborted));
    }

    #[tokio::test]
    async fn closed_bus_ends_the_run() {
        let (publisher, subscriber) = bus::channel();
        publisher.publish(monitor(1, false));
        drop(publisher);
        let summary = Engine::new(subscriber, ProducerSet::new(), MetricsLog::disabled(), 0)
            .run(std::future::pending())
            .await
            .unwrap();
        assert_eq!(summary.outcome, RunOutcome::BusClosed);
        assert_eq!(summary.samples, 1);
    }
}
