use crate::error::{BgperfError, Result};
use crate::script::Script;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Sections of a scenario file the engine does not interpret (`tester`,
/// policy definitions, ...). Kept so the backup is a faithful copy.
pub type Extra = BTreeMap<String, serde_yaml::Value>;

// ---------------------------------------------------------------------------
// TargetConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(rename = "as", default)]
    pub asn: u32,
    #[serde(rename = "local-address", default)]
    pub local_address: String,
    /// The target runs outside of docker; no resource telemetry is collected.
    #[serde(default, deserialize_with = "loose_bool")]
    pub remote: bool,
    /// Container running the bgpd under test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// cpuset of the target container, e.g. `0-3,6`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl TargetConfig {
    /// `local-address` without its prefix length.
    pub fn address(&self) -> &str {
        self.local_address
            .split('/')
            .next()
            .unwrap_or(&self.local_address)
    }

    /// Core ids of the configured cpuset; empty when none is set.
    pub fn cores(&self) -> Result<Vec<u32>> {
        match self.cpus.as_deref() {
            Some(spec) if !spec.trim().is_empty() => parse_cpuset(spec),
            _ => Ok(vec![]),
        }
    }
}

/// Accepts `true`/`false`, the strings `"true"`/`""`, or null.
fn loose_bool<'de, D>(d: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Bool(bool),
        Str(String),
    }
    Ok(match Option::<Loose>::deserialize(d)? {
        Some(Loose::Bool(b)) => b,
        Some(Loose::Str(s)) => s.eq_ignore_ascii_case("true"),
        None => false,
    })
}

// ---------------------------------------------------------------------------
// MonitorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorImpl {
    Bird,
    #[default]
    Gobgp,
}

impl MonitorImpl {
    /// Command-line client used to query the monitor.
    pub fn client(&self) -> &'static str {
        match self {
            MonitorImpl::Bird => "birdc",
            MonitorImpl::Gobgp => "gobgp",
        }
    }

    fn default_container(&self) -> &'static str {
        match self {
            MonitorImpl::Bird => "birdmonitor",
            MonitorImpl::Gobgp => "monitor",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub implementation: MonitorImpl,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(rename = "check-points", default)]
    pub check_points: Vec<u64>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl MonitorConfig {
    pub fn container_name(&self) -> &str {
        self.container
            .as_deref()
            .unwrap_or_else(|| self.implementation.default_container())
    }
}

// ---------------------------------------------------------------------------
// BenchSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultInjectorConfig {
    #[serde(default = "default_fault_program")]
    pub program: String,
    /// Network interface the impairment is installed on.
    #[serde(default = "default_fault_device")]
    pub device: String,
}

fn default_fault_program() -> String {
    "comcast".to_string()
}

fn default_fault_device() -> String {
    "eno2".to_string()
}

impl Default for FaultInjectorConfig {
    fn default() -> Self {
        Self {
            program: default_fault_program(),
            device: default_fault_device(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchSettings {
    /// Monitor samples to wait after the last checkpoint hit.
    #[serde(default)]
    pub cooling: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_established_timeout")]
    pub established_timeout_seconds: u64,
    #[serde(default)]
    pub fault_injector: FaultInjectorConfig,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_established_timeout() -> u64 {
    120
}

impl Default for BenchSettings {
    fn default() -> Self {
        Self {
            cooling: 0,
            interval_ms: default_interval_ms(),
            established_timeout_seconds: default_established_timeout(),
            fault_injector: FaultInjectorConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// BenchConfig
// ---------------------------------------------------------------------------

/// A scenario file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub script: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub bench: BenchSettings,
    #[serde(flatten)]
    pub extra: Extra,
}

fn null_as_empty<'de, D>(d: D) -> std::result::Result<Vec<serde_yaml::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<serde_yaml::Value>>::deserialize(d)?.unwrap_or_default())
}

impl BenchConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: BenchConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Write the resolved scenario (with any script override applied).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_yaml::to_string(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.asn == 0 {
            return Err(BgperfError::InvalidConfig(
                "target.as must be set".to_string(),
            ));
        }
        if self.target.local_address.is_empty() {
            return Err(BgperfError::InvalidConfig(
                "target.local-address must be set".to_string(),
            ));
        }
        if !self.target.remote && self.target.container.is_none() {
            return Err(BgperfError::InvalidConfig(
                "target.container is required unless target.remote is set".to_string(),
            ));
        }
        if self.bench.interval_ms == 0 {
            return Err(BgperfError::InvalidConfig(
                "bench.interval_ms must be greater than zero".to_string(),
            ));
        }
        self.target.cores()?;
        Ok(())
    }

    pub fn script(&self) -> Script {
        Script::new(self.script.clone())
    }

    /// Replace the embedded script, e.g. with one given on the command line.
    pub fn override_script(&mut self, script: &Script) {
        self.script = script.entries().cloned().collect();
    }

    /// Number of entries in `tester.peers`, if the scenario carries one.
    pub fn tester_peer_count(&self) -> Option<usize> {
        let peers = self.extra.get("tester")?.get("peers")?;
        match peers {
            serde_yaml::Value::Mapping(m) => Some(m.len()),
            serde_yaml::Value::Sequence(s) => Some(s.len()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// cpuset
// ---------------------------------------------------------------------------

/// Expand a cpuset like `0-3,6` into its core ids.
pub fn parse_cpuset(spec: &str) -> Result<Vec<u32>> {
    let invalid = || BgperfError::InvalidCpuset(spec.to_string());
    let mut cores = Vec::new();
    for part in spec.split(',').map(str::trim) {
        let (lo, hi) = match part.split_once('-') {
            Some((lo, hi)) => (lo.trim(), hi.trim()),
            None => (part, part),
        };
        let lo: u32 = lo.parse().map_err(|_| invalid())?;
        let hi: u32 = hi.parse().map_err(|_| invalid())?;
        if lo > hi {
            return Err(invalid());
        }
        cores.extend(lo..=hi);
    }
    Ok(cores)
}
