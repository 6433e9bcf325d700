//! `bgperf-core`: execution engine for BGP benchmark runs.
//!
//! A run is a script of actions (wait for convergence, sleep, inject packet
//! loss toward peers, run a program) executed against live telemetry from
//! the bgpd under test and a monitoring peer.
//!
//! # Architecture
//!
//! ```text
//! Probe (target)  ─┐
//! Probe (monitor) ─┼─► bus ─► Engine ─┬─► MetricsLog (CSV)
//!                  │                  ├─► Cooldown  (ends the run)
//!                  │                  ▼
//!                  └───────────── Sequencer ─► Action
//!                    (sequencer        │
//!                     events)          └─► FaultInjector
//! ```
//!
//! Producers poll on their own tasks. The engine and the sequencer run on a
//! single task; actions are polled synchronously from the engine's handling
//! of each monitor sample.

pub mod action;
pub mod bus;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod fault;
pub mod history;
pub mod latch;
pub mod metrics;
pub mod producer;
pub mod script;
pub mod sequencer;
pub mod telemetry;

pub use error::{BgperfError, Result};
