//! Action scripts: the ordered list of steps a benchmark run executes.
//!
//! A script is a YAML list under a top-level `script:` key:
//!
//! ```yaml
//! script:
//!   - action: {type: wait_convergent, cpu_below: 10, routes: 100000, confidence: 5}
//!   - action: {type: interrupt_peers, peers: [10.10.0.3], duration: 30, recovery: 10}
//!   - action: {type: sleep, duration: 60}
//! ```
//!
//! Entries are kept as raw YAML and decoded one at a time when the sequencer
//! pops them, so a bad entry only aborts the run when it is reached.

use serde::{Deserialize, Deserializer};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{BgperfError, Result};

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    WaitConvergent,
    Sleep,
    InterruptPeers,
    Execute,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::WaitConvergent,
        ActionKind::Sleep,
        ActionKind::InterruptPeers,
        ActionKind::Execute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::WaitConvergent => "wait_convergent",
            ActionKind::Sleep => "sleep",
            ActionKind::InterruptPeers => "interrupt_peers",
            ActionKind::Execute => "execute",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionSpec
// ---------------------------------------------------------------------------

/// Parameters of one script step. Field names follow the script format;
/// the long names are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    WaitConvergent {
        #[serde(rename = "cpu_below", alias = "cpu_threshold")]
        cpu_threshold: f64,
        #[serde(rename = "routes", alias = "min_routes")]
        min_routes: u64,
        #[serde(rename = "confidence", alias = "confidence_count")]
        confidence_count: usize,
        /// Give up after this many seconds without convergence.
        #[serde(default, rename = "timeout", alias = "timeout_seconds")]
        timeout_seconds: Option<f64>,
    },
    Sleep {
        #[serde(rename = "duration", alias = "duration_seconds")]
        duration_seconds: f64,
    },
    InterruptPeers {
        #[serde(rename = "peers", alias = "peer_addresses")]
        peer_addresses: Vec<String>,
        #[serde(rename = "duration", alias = "duration_seconds")]
        duration_seconds: f64,
        #[serde(
            default,
            rename = "recovery",
            alias = "recovery_seconds",
            deserialize_with = "null_as_zero"
        )]
        recovery_seconds: f64,
        #[serde(
            default = "default_loss",
            rename = "loss",
            alias = "loss_percent",
            deserialize_with = "null_as_full_loss"
        )]
        loss_percent: u8,
    },
    Execute {
        path: PathBuf,
    },
}

fn default_loss() -> u8 {
    100
}

fn null_as_zero<'de, D>(d: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(0.0))
}

fn null_as_full_loss<'de, D>(d: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u8>::deserialize(d)?.unwrap_or_else(default_loss))
}

impl ActionSpec {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionSpec::WaitConvergent { .. } => ActionKind::WaitConvergent,
            ActionSpec::Sleep { .. } => ActionKind::Sleep,
            ActionSpec::InterruptPeers { .. } => ActionKind::InterruptPeers,
            ActionSpec::Execute { .. } => ActionKind::Execute,
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ActionSpec::WaitConvergent {
                cpu_threshold,
                confidence_count,
                timeout_seconds,
                ..
            } => {
                if !cpu_threshold.is_finite() {
                    return Err("cpu_below must be a finite number".into());
                }
                if *confidence_count == 0 {
                    return Err("confidence must be at least 1".into());
                }
                if let Some(t) = timeout_seconds {
                    check_seconds("timeout", *t)?;
                }
                Ok(())
            }
            ActionSpec::Sleep { duration_seconds } => check_seconds("duration", *duration_seconds),
            ActionSpec::InterruptPeers {
                peer_addresses,
                duration_seconds,
                recovery_seconds,
                loss_percent,
            } => {
                if peer_addresses.is_empty() {
                    return Err("peers must not be empty".into());
                }
                if *loss_percent > 100 {
                    return Err(format!("loss must be 0..=100, got {loss_percent}"));
                }
                check_seconds("duration", *duration_seconds)?;
                check_seconds("recovery", *recovery_seconds)
            }
            ActionSpec::Execute { path } => {
                if path.as_os_str().is_empty() {
                    return Err("path must not be empty".into());
                }
                Ok(())
            }
        }
    }
}

fn check_seconds(field: &str, value: f64) -> std::result::Result<(), String> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(format!("{field} must be a non-negative number of seconds"))
    }
}

// ---------------------------------------------------------------------------
// Entry decoding
// ---------------------------------------------------------------------------

/// Decode one raw `{action: {type, ...}}` entry.
///
/// Returns the raw type tag (for reporting, even when it is unknown) and the
/// decoded spec.
pub fn decode_entry(index: usize, entry: &serde_yaml::Value) -> (String, Result<ActionSpec>) {
    let Some(action) = entry.get("action") else {
        return (
            "<missing>".to_string(),
            Err(BgperfError::InvalidAction {
                index,
                kind: "<missing>".to_string(),
                reason: "entry has no 'action' mapping".to_string(),
            }),
        );
    };

    let Some(tag) = action.get("type").and_then(|t| t.as_str()) else {
        return (
            "<missing>".to_string(),
            Err(BgperfError::InvalidAction {
                index,
                kind: "<missing>".to_string(),
                reason: "action has no 'type'".to_string(),
            }),
        );
    };
    let tag = tag.to_string();

    if ActionKind::parse(&tag).is_none() {
        let err = BgperfError::UnknownAction {
            index,
            kind: tag.clone(),
        };
        return (tag, Err(err));
    }

    let spec = serde_yaml::from_value::<ActionSpec>(action.clone())
        .map_err(|e| e.to_string())
        .and_then(|spec| spec.validate().map(|_| spec))
        .map_err(|reason| BgperfError::InvalidAction {
            index,
            kind: tag.clone(),
            reason,
        });
    (tag, spec)
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// A script entry popped by the sequencer.
#[derive(Debug)]
pub struct ScriptStep {
    /// Zero-based position in the original script.
    pub index: usize,
    /// Raw `type` tag as written in the script.
    pub kind: String,
    pub spec: Result<ActionSpec>,
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    #[serde(default)]
    script: Option<Vec<serde_yaml::Value>>,
}

/// Ordered script, consumed front to back.
#[derive(Debug, Clone, Default)]
pub struct Script {
    entries: VecDeque<serde_yaml::Value>,
    next_index: usize,
}

impl Script {
    pub fn new(entries: Vec<serde_yaml::Value>) -> Self {
        Self {
            entries: entries.into(),
            next_index: 0,
        }
    }

    /// Parse a YAML document with a top-level `script:` list.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: ScriptFile = serde_yaml::from_str(text)?;
        Ok(Self::new(file.script.unwrap_or_default()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and decode the next entry.
    pub fn pop(&mut self) -> Option<ScriptStep> {
        let entry = self.entries.pop_front()?;
        let index = self.next_index;
        self.next_index += 1;
        let (kind, spec) = decode_entry(index, &entry);
        Some(ScriptStep { index, kind, spec })
    }

    /// Decode every remaining entry without consuming the script.
    pub fn decode_all(&self) -> Vec<(String, Result<ActionSpec>)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| decode_entry(self.next_index + i, entry))
            .collect()
    }

    /// Drop every remaining entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> impl Iterator<Item = &serde_yaml::Value> {
        self.entries.iter()
    }
}
