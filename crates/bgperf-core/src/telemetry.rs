//! Telemetry payloads flowing from the producers to the main loop, and the
//! reduced sample the main loop hands to the sequencer.

use std::time::Duration;

// ---------------------------------------------------------------------------
// TelemetrySample
// ---------------------------------------------------------------------------

/// The unit of information an action consumes: one monitor tick combined
/// with the latest target gauges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    /// Time since the benchmark run started.
    pub elapsed: Duration,
    /// Latest CPU usage of the system under test, in percent.
    pub cpu_percent: f64,
    /// Latest memory usage of the system under test, in bytes.
    pub mem_bytes: u64,
    /// Routes the monitor has received from the system under test.
    pub received_routes: u64,
}

// ---------------------------------------------------------------------------
// ResourceSample (target origin)
// ---------------------------------------------------------------------------

/// Frequency of one CPU core, as reported by `cpupower monitor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreFrequency {
    pub core: u32,
    pub mhz: u64,
}

/// One resource reading for a container.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub mem_bytes: u64,
    /// Only populated when the target runs on a pinned cpuset.
    pub core_frequencies: Vec<CoreFrequency>,
}

// ---------------------------------------------------------------------------
// MonitorSample (monitor origin)
// ---------------------------------------------------------------------------

/// Implementation-dependent routing state reported by the monitoring peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    /// Parsed from `birdc show route count`.
    Bird {
        routes_matching: u64,
        routes_all: u64,
        unique_networks: u64,
    },
    /// Parsed from the GoBGP neighbor adj-table. GoBGP cannot report unique
    /// networks.
    Gobgp { accepted: Option<u64> },
}

impl MonitorState {
    pub fn received_routes(&self) -> u64 {
        match self {
            Self::Bird {
                routes_matching, ..
            } => *routes_matching,
            Self::Gobgp { accepted } => accepted.unwrap_or(0),
        }
    }

    pub fn unique_networks(&self) -> u64 {
        match self {
            Self::Bird {
                unique_networks, ..
            } => *unique_networks,
            Self::Gobgp { .. } => 0,
        }
    }
}

/// One tick from the monitoring peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSample {
    pub state: MonitorState,
    /// Set when this tick matched the next configured checkpoint.
    pub checkpoint_hit: bool,
}
