use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bgperf_core::action::ActionContext;
use bgperf_core::bus;
use bgperf_core::checkpoint::Checkpoints;
use bgperf_core::config::{BenchConfig, MonitorImpl};
use bgperf_core::engine::{Engine, RunOutcome, RunSummary};
use bgperf_core::fault::FaultInjector;
use bgperf_core::metrics::MetricsLog;
use bgperf_core::producer::ProducerSet;
use bgperf_core::script::Script;
use bgperf_core::sequencer::Sequencer;
use bgperf_probe::{BirdMonitorProbe, ComcastInjector, DockerStatsProbe, GobgpMonitorProbe};
use clap::Args;
use tracing::{info, warn};

use crate::cmd::doctor;
use crate::os_signals::ShutdownSignal;
use crate::output::{print_json, print_table};

/// `--output` value that places the CSV next to the scenario backup.
const CONFIG_DIR: &str = "config_dir";

#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Scenario file describing target, monitor and script
    #[arg(short = 'f', long = "file", value_name = "CONFIG_FILE")]
    pub file: PathBuf,

    /// Directory receiving the per-benchmark output folder
    #[arg(short = 'd', long, default_value = "/tmp", env = "BGPERF_DIR")]
    pub dir: PathBuf,

    #[arg(short = 'b', long, default_value = "bgperf")]
    pub bench_name: String,

    /// Action script; replaces any script in the scenario
    #[arg(short = 's', long, value_name = "SCRIPT_FILE")]
    pub script: Option<PathBuf>,

    /// Monitor samples to keep running after the last checkpoint
    #[arg(short = 'g', long)]
    pub cooling: Option<u32>,

    /// CSV metrics file; "config_dir" writes output_<bench-name>.csv into the
    /// benchmark folder
    #[arg(short = 'o', long, value_name = "STAT_FILE")]
    pub output: Option<String>,

    /// Sampling interval in seconds
    #[arg(short = 'm', long)]
    pub measurement_interval: Option<u64>,

    /// Use the BIRD monitor regardless of the scenario
    #[arg(short = 'y', long)]
    pub bird_monitor: bool,

    /// Override the target's cpuset, e.g. "0-3"
    #[arg(long)]
    pub target_cpus: Option<String>,
}

// ---------------------------------------------------------------------------
// BenchExit: typed non-zero exit codes
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum BenchExit {
    Interrupted,
    ScriptAborted { reason: String },
    TelemetryLost,
}

impl BenchExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchExit::Interrupted => 130,
            BenchExit::ScriptAborted { .. } => 2,
            BenchExit::TelemetryLost => 1,
        }
    }
}

impl std::fmt::Display for BenchExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BenchExit::Interrupted => write!(f, "benchmark interrupted"),
            BenchExit::ScriptAborted { reason } => write!(f, "script aborted: {reason}"),
            BenchExit::TelemetryLost => {
                write!(f, "all telemetry producers stopped before the run finished")
            }
        }
    }
}

impl std::error::Error for BenchExit {}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn run(args: BenchArgs, json: bool) -> Result<()> {
    let config = resolve_config(&args)?;

    let bench_dir = args.dir.join(&args.bench_name);
    let backup = bench_dir.join("scenario.yaml");
    config
        .save(&backup)
        .with_context(|| format!("failed to write {}", backup.display()))?;
    info!(path = %backup.display(), "scenario saved");

    if let Some(peers) = config.tester_peer_count() {
        if let Ok(limit) = doctor::gc_thresh3() {
            if peers as u64 > limit {
                warn!(
                    "gc_thresh3 ({limit}) is lower than the number of peers ({peers}); \
                     raise it with: echo 16384 | sudo tee {}",
                    doctor::GC_THRESH3
                );
            }
        }
    }

    let cores = config.target.cores()?;
    let metrics = match metrics_path(args.output.as_deref(), &bench_dir, &args.bench_name) {
        Some(path) => MetricsLog::create(&path, &cores)
            .with_context(|| format!("failed to create {}", path.display()))?,
        None => MetricsLog::disabled(),
    };

    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(execute(config, cores, metrics))?;

    print_summary(&summary, json)?;
    match summary.outcome {
        RunOutcome::CooledDown => Ok(()),
        RunOutcome::Interrupted => Err(BenchExit::Interrupted.into()),
        RunOutcome::Aborted { reason } => Err(BenchExit::ScriptAborted { reason }.into()),
        RunOutcome::BusClosed => Err(BenchExit::TelemetryLost.into()),
    }
}

/// Load the scenario and apply command-line overrides.
fn resolve_config(args: &BenchArgs) -> Result<BenchConfig> {
    let mut config = BenchConfig::load(&args.file)
        .with_context(|| format!("failed to load scenario {}", args.file.display()))?;

    if let Some(path) = &args.script {
        let script = Script::load(path)
            .with_context(|| format!("failed to load script {}", path.display()))?;
        config.override_script(&script);
    }
    if let Some(cooling) = args.cooling {
        config.bench.cooling = cooling;
    }
    if let Some(secs) = args.measurement_interval {
        config.bench.interval_ms = secs.max(1) * 1000;
    }
    if args.bird_monitor {
        config.monitor.implementation = MonitorImpl::Bird;
    }
    if let Some(cpus) = &args.target_cpus {
        config.target.cpus = Some(cpus.clone());
    }
    config.validate()?;
    Ok(config)
}

fn metrics_path(output: Option<&str>, bench_dir: &Path, bench_name: &str) -> Option<PathBuf> {
    match output? {
        CONFIG_DIR => Some(bench_dir.join(format!("output_{bench_name}.csv"))),
        path => Some(PathBuf::from(path)),
    }
}

async fn execute(config: BenchConfig, cores: Vec<u32>, metrics: MetricsLog) -> Result<RunSummary> {
    let (publisher, subscriber) = bus::channel();
    let interval = Duration::from_millis(config.bench.interval_ms);
    let checkpoints = Checkpoints::new(config.monitor.check_points.iter().copied());
    let monitor = config.monitor.container_name().to_string();

    let mut producers = ProducerSet::new();
    match config.monitor.implementation {
        MonitorImpl::Bird => {
            let probe = BirdMonitorProbe::new(&monitor, checkpoints);
            info!(monitor = %monitor, "waiting for BGP session between target and monitor");
            probe
                .wait_established(
                    config.target.asn,
                    Duration::from_secs(config.bench.established_timeout_seconds),
                    Duration::from_secs(1),
                )
                .await
                .context("monitor session never came up")?;
            producers.spawn(probe, interval, publisher.clone());
        }
        MonitorImpl::Gobgp => {
            let probe = GobgpMonitorProbe::new(&monitor, config.target.address(), checkpoints);
            producers.spawn(probe, interval, publisher.clone());
        }
    }

    match (&config.target.container, config.target.remote) {
        (Some(container), false) => {
            producers.spawn(DockerStatsProbe::new(container, cores), interval, publisher.clone());
        }
        _ => info!("remote target: no resource telemetry"),
    }

    // listen before the sequencer starts: its first entry may apply a fault
    let mut shutdown = match ShutdownSignal::listen() {
        Ok(signal) => Some(signal),
        Err(e) => {
            warn!(error = %e, "cannot listen for signals; stop the run with the cooldown only");
            None
        }
    };

    let mut engine = Engine::new(subscriber, producers, metrics, config.bench.cooling);
    let script = config.script();
    if !script.is_empty() {
        let faults: Arc<dyn FaultInjector> =
            Arc::new(ComcastInjector::from_config(&config.bench.fault_injector));
        let ctx = ActionContext {
            publisher: publisher.clone(),
            faults,
        };
        engine = engine.with_sequencer(Sequencer::new(script, ctx));
    }
    // the sequencer keeps its own publisher, so with a script the bus stays
    // open until the engine drops it
    drop(publisher);

    let interrupt = async move {
        match shutdown.as_mut() {
            Some(signal) => signal.recv().await,
            None => std::future::pending().await,
        }
    };
    Ok(engine.run(interrupt).await?)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "outcome": summary.outcome.to_string(),
            "samples": summary.samples,
            "max_prefixes": summary.max_prefixes,
            "expected_prefixes": summary.expected_prefixes,
            "elapsed_seconds": summary.elapsed.as_secs_f64(),
        }));
    }
    print_table(
        &["OUTCOME", "SAMPLES", "MAX PREFIXES", "EXPECTED", "ELAPSED"],
        &[vec![
            summary.outcome.to_string(),
            summary.samples.to_string(),
            summary.max_prefixes.to_string(),
            summary.expected_prefixes.to_string(),
            format!("{:.1}s", summary.elapsed.as_secs_f64()),
        ]],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: BenchArgs,
    }

    fn args(extra: &[&str]) -> BenchArgs {
        let mut argv = vec!["bench"];
        argv.extend_from_slice(extra);
        Harness::parse_from(argv).args
    }

    #[test]
    fn exit_codes() {
        assert_eq!(BenchExit::Interrupted.exit_code(), 130);
        assert_eq!(
            BenchExit::ScriptAborted {
                reason: "x".into()
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn config_dir_output_lands_in_bench_folder() {
        let dir = Path::new("/tmp/bgperf");
        assert_eq!(
            metrics_path(Some("config_dir"), dir, "bgperf"),
            Some(PathBuf::from("/tmp/bgperf/output_bgperf.csv"))
        );
        assert_eq!(
            metrics_path(Some("stats.csv"), dir, "bgperf"),
            Some(PathBuf::from("stats.csv"))
        );
        assert_eq!(metrics_path(None, dir, "bgperf"), None);
    }

    #[test]
    fn overrides_apply_on_top_of_scenario() {
        let dir = tempfile::TempDir::new().unwrap();
        let scenario = dir.path().join("scenario.yaml");
        std::fs::write(
            &scenario,
            "target: {as: 1000, local-address: 10.10.0.1/16, container: gobgp}\n\
             script:\n  - action: {type: sleep, duration: 1}\n",
        )
        .unwrap();
        let script = dir.path().join("script.yaml");
        std::fs::write(
            &script,
            "script:\n  - action: {type: sleep, duration: 1}\n  - action: {type: sleep, duration: 2}\n",
        )
        .unwrap();

        let scenario_arg = scenario.to_string_lossy().into_owned();
        let script_arg = script.to_string_lossy().into_owned();
        let config = resolve_config(&args(&[
            "-f",
            &scenario_arg,
            "-s",
            &script_arg,
            "-g",
            "7",
            "-m",
            "2",
            "-y",
            "--target-cpus",
            "1-2",
        ]))
        .unwrap();

        assert_eq!(config.script().len(), 2);
        assert_eq!(config.bench.cooling, 7);
        assert_eq!(config.bench.interval_ms, 2000);
        assert_eq!(config.monitor.implementation, MonitorImpl::Bird);
        assert_eq!(config.target.cores().unwrap(), vec![1, 2]);
    }
}
