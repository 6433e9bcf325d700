//! Fault-injection capability used by `interrupt_peers`.
//!
//! The engine only knows this trait; the command-line backed implementation
//! lives in `bgperf-probe`. Failures are values handed back to the caller,
//! which logs them and keeps going.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaultError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with code {code}")]
    ExitCode { program: String, code: i32 },

    #[error("'{program}' was terminated by a signal")]
    Signalled { program: String },
}

/// Applies and clears simulated packet loss toward a set of peers.
pub trait FaultInjector: Send + Sync {
    /// Drop `loss_percent`% of TCP packets toward `peers`.
    fn apply(&self, peers: &[String], loss_percent: u8) -> Result<(), FaultError>;

    /// Remove every impairment this injector installed.
    fn clear(&self) -> Result<(), FaultError>;
}
