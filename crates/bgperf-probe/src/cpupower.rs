//! Per-core frequencies from `cpupower monitor -mMperf`.
//!
//! ```text
//!              |Mperf
//! PKG |CORE|CPU | C0   | Cx   | Freq
//!    0|   0|   0|  0.00| 100.0|4400
//!    2|   0|   1|  0.00| 100.0|3874
//! ```
//!
//! The readings only make sense for a one second sampling interval.

use bgperf_core::telemetry::CoreFrequency;

use crate::command::run_command;
use crate::error::{ProbeError, Result};

pub async fn read_frequencies(cores: &[u32]) -> Result<Vec<CoreFrequency>> {
    let output = run_command("cpupower", &["monitor", "-mMperf"]).await?;
    parse_monitor(&output, cores)
}

/// Pick the `Freq` column for each of `cores`, in the order given.
pub fn parse_monitor(output: &str, cores: &[u32]) -> Result<Vec<CoreFrequency>> {
    let mut lines = output.lines().skip(1);
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| ProbeError::parse("cpupower", "missing header line"))?
        .split('|')
        .map(str::trim)
        .collect();
    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| ProbeError::parse("cpupower", format!("no '{name}' column")))
    };
    let cpu_col = column("CPU")?;
    let freq_col = column("Freq")?;

    let mut by_cpu = Vec::new();
    for line in lines.filter(|l| !l.trim().is_empty()) {
        let values: Vec<&str> = line.split('|').map(str::trim).collect();
        let (Some(cpu), Some(freq)) = (values.get(cpu_col), values.get(freq_col)) else {
            return Err(ProbeError::parse("cpupower", line));
        };
        let cpu: u32 = cpu.parse().map_err(|_| ProbeError::parse("cpupower", line))?;
        let mhz = freq
            .parse::<f64>()
            .map_err(|_| ProbeError::parse("cpupower", line))?;
        by_cpu.push(CoreFrequency {
            core: cpu,
            mhz: mhz.round() as u64,
        });
    }

    cores
        .iter()
        .map(|core| {
            by_cpu
                .iter()
                .find(|f| f.core == *core)
                .copied()
                .ok_or_else(|| ProbeError::parse("cpupower", format!("no reading for cpu {core}")))
        })
        .collect()
}
