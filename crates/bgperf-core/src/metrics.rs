//! CSV metrics log: one row per monitor sample.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::error::Result;
use crate::telemetry::CoreFrequency;

const HEADER: &str = "elapsed, cpu, mem, nets, recvd, delta, time";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Values written for one monitor sample.
#[derive(Debug, Clone)]
pub struct MetricsRow<'a> {
    pub elapsed: Duration,
    pub cpu_percent: f64,
    pub mem_bytes: u64,
    pub unique_networks: u64,
    pub received_routes: u64,
    pub prefix_delta: i64,
    pub time: DateTime<Local>,
    pub core_frequencies: &'a [CoreFrequency],
}

/// Writer for the metrics CSV. Every row is flushed as soon as it is written
/// so a crashed run still leaves its data behind.
///
/// Rows always have one frequency cell per header core; a core without a
/// reading gets an empty cell.
pub struct MetricsLog {
    out: Option<Box<dyn Write + Send>>,
    cores: Vec<u32>,
}

impl MetricsLog {
    /// Create (truncate) `path` and write the header. `cores` are the CPU ids
    /// of the target's cpuset; each gets a `cpufreq_<id>` column.
    pub fn create(path: &Path, cores: &[u32]) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Self::from_writer(Box::new(BufWriter::new(file)), cores)
    }

    pub fn from_writer(mut out: Box<dyn Write + Send>, cores: &[u32]) -> Result<Self> {
        let mut header = HEADER.to_string();
        for core in cores {
            header.push_str(&format!(", cpufreq_{core}"));
        }
        writeln!(out, "{header}")?;
        out.flush()?;
        Ok(Self {
            out: Some(out),
            cores: cores.to_vec(),
        })
    }

    /// A log that drops every row (no `--output` given).
    pub fn disabled() -> Self {
        Self {
            out: None,
            cores: vec![],
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.out.is_some()
    }

    pub fn write_row(&mut self, row: &MetricsRow<'_>) -> Result<()> {
        let Some(out) = self.out.as_mut() else {
            return Ok(());
        };
        let mut line = format!(
            "{:.3}, {:.2}, {}, {}, {}, {}, {}",
            row.elapsed.as_secs_f64(),
            row.cpu_percent,
            row.mem_bytes,
            row.unique_networks,
            row.received_routes,
            row.prefix_delta,
            row.time.format(TIME_FORMAT),
        );
        for core in &self.cores {
            match row.core_frequencies.iter().find(|f| f.core == *core) {
                Some(freq) => line.push_str(&format!(", {}", freq.mhz)),
                None => line.push_str(", "),
            }
        }
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }

    /// Flush and close. Later writes are dropped.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MetricsLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsLog")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Human readable byte count using decimal units.
pub fn format_bytes(v: u64) -> String {
    let v = v as f64;
    if v > 1e9 {
        format!("{:.2}GB", v / 1e9)
    } else if v > 1e6 {
        format!("{:.2}MB", v / 1e6)
    } else if v > 1e3 {
        format!("{:.2}KB", v / 1e3)
    } else {
        format!("{v:.2}B")
    }
}
