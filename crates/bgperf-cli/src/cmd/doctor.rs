use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use bgperf_core::config::BenchConfig;
use serde::Serialize;

use crate::output::{print_json, print_table};

/// Kernel limit on neighbour table entries. Each BGP peer needs one.
pub const GC_THRESH3: &str = "/proc/sys/net/ipv4/neigh/default/gc_thresh3";

pub fn gc_thresh3() -> Result<u64> {
    read_limit(Path::new(GC_THRESH3))
}

fn read_limit(path: &Path) -> Result<u64> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    text.trim()
        .parse()
        .map_err(|_| anyhow!("unexpected content in {}: {:?}", path.display(), text.trim()))
}

#[derive(Debug, Serialize)]
struct Check {
    name: String,
    purpose: &'static str,
    required: bool,
    path: Option<PathBuf>,
}

fn check(name: &str, purpose: &'static str, required: bool) -> Check {
    Check {
        name: name.to_string(),
        purpose,
        required,
        path: which::which(name).ok(),
    }
}

/// Report the host tools a benchmark run shells out to, and the neighbour
/// table limit. Fails if a required tool is missing.
pub fn run(file: Option<&Path>, json: bool) -> Result<()> {
    let config = file
        .map(|f| {
            BenchConfig::load(f).with_context(|| format!("failed to load scenario {}", f.display()))
        })
        .transpose()?;

    let fault_program = config
        .as_ref()
        .map(|c| c.bench.fault_injector.program.clone())
        .unwrap_or_else(|| "comcast".to_string());
    let wants_frequencies = config
        .as_ref()
        .and_then(|c| c.target.cpus.as_ref())
        .is_some();
    let monitor_client = config
        .as_ref()
        .map(|c| c.monitor.implementation.client())
        .unwrap_or("gobgp");

    let checks = vec![
        check("docker", "container stats and monitor queries", true),
        check(&fault_program, "interrupt_peers packet loss", false),
        check("cpupower", "per-core frequencies", wants_frequencies),
        check(monitor_client, "monitor client (used inside its container)", false),
    ];

    let limit = gc_thresh3().ok();
    let peers = config.as_ref().and_then(BenchConfig::tester_peer_count);

    if json {
        print_json(&serde_json::json!({
            "tools": checks,
            "gc_thresh3": limit,
            "peers": peers,
        }))?;
    } else {
        let rows: Vec<Vec<String>> = checks
            .iter()
            .map(|c| {
                vec![
                    c.name.clone(),
                    match &c.path {
                        Some(p) => p.display().to_string(),
                        None if c.required => "MISSING".to_string(),
                        None => "not found".to_string(),
                    },
                    c.purpose.to_string(),
                ]
            })
            .collect();
        print_table(&["TOOL", "PATH", "USED FOR"], &rows);
        println!();
        match limit {
            Some(limit) => println!("gc_thresh3: {limit}"),
            None => println!("gc_thresh3: unavailable"),
        }
    }

    if let (Some(limit), Some(peers)) = (limit, peers) {
        if peers as u64 > limit {
            eprintln!(
                "warning: gc_thresh3 ({limit}) is lower than the number of peers ({peers})\n\
                 raise it with: echo 16384 | sudo tee {GC_THRESH3}"
            );
        }
    }

    let missing: Vec<&str> = checks
        .iter()
        .filter(|c| c.required && c.path.is_none())
        .map(|c| c.name.as_str())
        .collect();
    if !missing.is_empty() {
        bail!("required tools not found: {}", missing.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_numeric_limit() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gc_thresh3");
        std::fs::write(&path, "1024\n").unwrap();
        assert_eq!(read_limit(&path).unwrap(), 1024);

        std::fs::write(&path, "lots\n").unwrap();
        assert!(read_limit(&path).is_err());
        assert!(read_limit(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn check_reports_missing_tool() {
        let c = check("__bgperf_no_such_tool__", "nothing", true);
        assert!(c.path.is_none());
        assert!(c.required);
    }
}
