use bgperf_core::bus::BusMessage;
use bgperf_core::producer::Probe;
use bgperf_core::telemetry::ResourceSample;
use serde::Deserialize;
use tracing::warn;

use crate::command::run_command;
use crate::cpupower;
use crate::error::{ProbeError, Result};

/// One line of `docker stats --no-stream --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct StatsLine {
    #[serde(rename = "CPUPerc")]
    cpu_perc: String,
    #[serde(rename = "MemUsage")]
    mem_usage: String,
}

/// Resource usage of the container running the bgpd under test.
#[derive(Debug, Clone)]
pub struct DockerStatsProbe {
    container: String,
    /// Cores of the container's cpuset; when non-empty, per-core frequencies
    /// are read alongside each sample.
    cores: Vec<u32>,
}

impl DockerStatsProbe {
    pub fn new(container: impl Into<String>, cores: Vec<u32>) -> Self {
        Self {
            container: container.into(),
            cores,
        }
    }

    pub async fn sample(&self) -> Result<ResourceSample> {
        let output = run_command(
            "docker",
            &[
                "stats",
                "--no-stream",
                "--format",
                "{{json .}}",
                self.container.as_str(),
            ],
        )
        .await?;
        let mut sample = parse_stats(&output)?;

        if !self.cores.is_empty() {
            // frequencies are best effort; a missing cpupower must not drop
            // the resource sample
            match cpupower::read_frequencies(&self.cores).await {
                Ok(freqs) => sample.core_frequencies = freqs,
                Err(e) => warn!(error = %e, "failed to read core frequencies"),
            }
        }
        Ok(sample)
    }
}

impl Probe for DockerStatsProbe {
    type Error = ProbeError;

    fn name(&self) -> &str {
        &self.container
    }

    async fn poll(&mut self) -> Result<BusMessage> {
        self.sample().await.map(BusMessage::Target)
    }
}

pub fn parse_stats(output: &str) -> Result<ResourceSample> {
    let line = output
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| ProbeError::parse("docker stats", "empty output"))?;
    let stats: StatsLine = serde_json::from_str(line)?;

    let cpu_percent = stats
        .cpu_perc
        .trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map_err(|_| {
            ProbeError::parse("docker stats", format!("CPUPerc '{}'", stats.cpu_perc))
        })?;
    let used = stats
        .mem_usage
        .split('/')
        .next()
        .unwrap_or_default();
    let mem_bytes = parse_size(used).ok_or_else(|| {
        ProbeError::parse("docker stats", format!("MemUsage '{}'", stats.mem_usage))
    })?;

    Ok(ResourceSample {
        cpu_percent,
        mem_bytes,
        core_frequencies: vec![],
    })
}

/// Parse sizes like `7.6MiB`, `1.2GB` or `512B`.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: f64 = number.parse().ok()?;
    let factor: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((number * factor).round() as u64)
}
