//! `bgperf-probe`: the command-line collaborators of a benchmark run.
//!
//! Probes shell out to `docker`, `birdc`, `gobgp` and `cpupower` and turn
//! their output into bus messages; [`ComcastInjector`] drives packet loss for
//! `interrupt_peers`. Parsing is kept in plain functions so it can be tested
//! without any of those tools installed.

pub mod bird;
pub mod command;
pub mod cpupower;
pub mod docker;
pub mod error;
pub mod fault;
pub mod gobgp;

pub use bird::BirdMonitorProbe;
pub use docker::DockerStatsProbe;
pub use error::{ProbeError, Result};
pub use fault::ComcastInjector;
pub use gobgp::GobgpMonitorProbe;
