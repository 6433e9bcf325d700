//! Event bus between the telemetry producers, the sequencer and the main loop.
//!
//! ```text
//! Publishers (many):                    Subscriber (one):
//!   target producer  ──┐
//!   monitor producer ──┼──► mpsc ──► Engine (main loop) ──► Sequencer
//!   sequencer        ──┘
//! ```
//!
//! The channel is unbounded: the sequencer publishes from inside the main
//! loop's own dispatch, so a bounded channel could block the only consumer.
//! Producers tick at about 1 Hz, which keeps the backlog small.
//!
//! Messages are delivered in enqueue order. Messages produced concurrently by
//! different producers carry no ordering guarantee relative to each other.

use tokio::sync::mpsc;

use crate::sequencer::SequencerEvent;
use crate::telemetry::{MonitorSample, ResourceSample};

/// Which part of the system a [`BusMessage`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Target,
    Monitor,
    Sequencer,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Target => "target",
            Origin::Monitor => "monitor",
            Origin::Sequencer => "sequencer",
        }
    }
}

/// A tagged message on the bus. The payload shape depends on the origin.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    Target(ResourceSample),
    Monitor(MonitorSample),
    Sequencer(SequencerEvent),
}

impl BusMessage {
    pub fn origin(&self) -> Origin {
        match self {
            BusMessage::Target(_) => Origin::Target,
            BusMessage::Monitor(_) => Origin::Monitor,
            BusMessage::Sequencer(_) => Origin::Sequencer,
        }
    }
}

/// Create a connected publisher/subscriber pair.
pub fn channel() -> (Publisher, Subscriber) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Publisher { tx }, Subscriber { rx })
}

/// Cloneable sending half. Every producer and the sequencer hold one.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::UnboundedSender<BusMessage>,
}

impl Publisher {
    /// Enqueue a message. Returns `false` once the subscriber is gone.
    pub fn publish(&self, msg: BusMessage) -> bool {
        self.tx.send(msg).is_ok()
    }

    pub fn sequencer(&self, event: SequencerEvent) -> bool {
        self.publish(BusMessage::Sequencer(event))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, owned by the main loop.
#[derive(Debug)]
pub struct Subscriber {
    rx: mpsc::UnboundedReceiver<BusMessage>,
}

impl Subscriber {
    /// Wait for the next message. `None` once every publisher is dropped.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }

    /// Non-blocking receive, used to drain the backlog.
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        self.rx.try_recv().ok()
    }
}
