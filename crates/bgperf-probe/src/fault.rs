use std::process::{Command, Stdio};

use bgperf_core::config::FaultInjectorConfig;
use bgperf_core::fault::{FaultError, FaultInjector};
use tracing::debug;

/// Packet loss through the `comcast` tool, applied to TCP traffic toward the
/// peers on one network device.
///
/// Runs synchronously: both invocations return once `comcast` has installed
/// or removed its rules.
#[derive(Debug, Clone)]
pub struct ComcastInjector {
    program: String,
    device: String,
}

impl ComcastInjector {
    pub fn new(program: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            device: device.into(),
        }
    }

    pub fn from_config(config: &FaultInjectorConfig) -> Self {
        Self::new(&config.program, &config.device)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn apply_args(&self, peers: &[String], loss_percent: u8) -> Vec<String> {
        vec![
            format!("--device={}", self.device),
            format!("--packet-loss={loss_percent}%"),
            format!("--target-addr={}", peers.join(",")),
            "--target-proto=tcp".to_string(),
        ]
    }

    pub fn clear_args(&self) -> Vec<String> {
        vec![format!("--device={}", self.device), "--stop".to_string()]
    }

    fn run(&self, args: &[String]) -> Result<(), FaultError> {
        debug!(program = %self.program, ?args, "running fault injector");
        let status = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| FaultError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            return Ok(());
        }
        Err(match status.code() {
            Some(code) => FaultError::ExitCode {
                program: self.program.clone(),
                code,
            },
            None => FaultError::Signalled {
                program: self.program.clone(),
            },
        })
    }
}

impl FaultInjector for ComcastInjector {
    fn apply(&self, peers: &[String], loss_percent: u8) -> Result<(), FaultError> {
        self.run(&self.apply_args(peers, loss_percent))
    }

    fn clear(&self) -> Result<(), FaultError> {
        self.run(&self.clear_args())
    }
}
