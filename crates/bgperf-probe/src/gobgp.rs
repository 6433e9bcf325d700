//! Monitoring peer backed by GoBGP, queried with `gobgp -j neighbor <addr>`.

use bgperf_core::bus::BusMessage;
use bgperf_core::checkpoint::Checkpoints;
use bgperf_core::producer::Probe;
use bgperf_core::telemetry::{MonitorSample, MonitorState};
use serde_json::Value;

use crate::command::docker_exec;
use crate::error::{ProbeError, Result};

/// Accepted-route count from the neighbor JSON.
///
/// Older GoBGP reports `state.adj-table.accepted`; newer releases move the
/// counters into `afi_safis[].state.accepted`, which are summed. An absent
/// counter means nothing has been accepted yet.
pub fn parse_neighbor(output: &str) -> Result<MonitorState> {
    let value: Value = serde_json::from_str(output.trim())?;
    let neighbor = match &value {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| ProbeError::parse("gobgp neighbor", "empty neighbor list"))?,
        other => other,
    };
    let state = neighbor
        .get("state")
        .ok_or_else(|| ProbeError::parse("gobgp neighbor", "no 'state' object"))?;

    let legacy = ["adj-table", "adj_table"]
        .iter()
        .find_map(|k| state.get(*k))
        .and_then(|t| t.get("accepted"))
        .and_then(Value::as_u64);

    let accepted = legacy.or_else(|| {
        let afi_safis = neighbor.get("afi_safis")?.as_array()?;
        let counts: Vec<u64> = afi_safis
            .iter()
            .filter_map(|a| a.get("state")?.get("accepted")?.as_u64())
            .collect();
        (!counts.is_empty()).then(|| counts.iter().sum())
    });

    Ok(MonitorState::Gobgp { accepted })
}

#[derive(Debug, Clone)]
pub struct GobgpMonitorProbe {
    container: String,
    neighbor: String,
    checkpoints: Checkpoints,
}

impl GobgpMonitorProbe {
    /// `neighbor` is the address of the bgpd under test as seen from the
    /// monitor.
    pub fn new(
        container: impl Into<String>,
        neighbor: impl Into<String>,
        checkpoints: Checkpoints,
    ) -> Self {
        Self {
            container: container.into(),
            neighbor: neighbor.into(),
            checkpoints,
        }
    }
}

impl Probe for GobgpMonitorProbe {
    type Error = ProbeError;

    fn name(&self) -> &str {
        &self.container
    }

    async fn poll(&mut self) -> Result<BusMessage> {
        let args = ["gobgp", "-j", "neighbor", self.neighbor.as_str()];
        let output = docker_exec(&self.container, &args).await?;
        let state = parse_neighbor(&output)?;
        let checkpoint_hit = self.checkpoints.check(state.received_routes());
        Ok(BusMessage::Monitor(MonitorSample {
            state,
            checkpoint_hit,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_legacy_adj_table() {
        let out = r#"{"conf":{"neighbor-address":"10.10.0.1"},"state":{"adj-table":{"received":1200,"accepted":1000,"advertised":0},"session-state":"established"}}"#;
        assert_eq!(
            parse_neighbor(out).unwrap(),
            MonitorState::Gobgp {
                accepted: Some(1000)
            }
        );
    }

    #[test]
    fn missing_counter_is_none() {
        let out = r#"{"state":{"adj-table":{}}}"#;
        let state = parse_neighbor(out).unwrap();
        assert_eq!(state, MonitorState::Gobgp { accepted: None });
        assert_eq!(state.received_routes(), 0);
    }

    #[test]
    fn sums_afi_safi_counters_in_list_output() {
        let out = r#"[{"state":{"session_state":6},"afi_safis":[{"state":{"accepted":700}},{"state":{"accepted":300}}]}]"#;
        assert_eq!(
            parse_neighbor(out).unwrap(),
            MonitorState::Gobgp {
                accepted: Some(1000)
            }
        );
    }

    #[test]
    fn malformed_output_is_an_error() {
        assert!(parse_neighbor("[]").is_err());
        assert!(parse_neighbor("{}").is_err());
        assert!(parse_neighbor("connection refused").is_err());
    }
}
