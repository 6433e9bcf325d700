//! Monitoring peer backed by BIRD, queried through `birdc` in its container.

use std::sync::OnceLock;
use std::time::Duration;

use bgperf_core::bus::BusMessage;
use bgperf_core::checkpoint::Checkpoints;
use bgperf_core::producer::Probe;
use bgperf_core::telemetry::{MonitorSample, MonitorState};
use regex::Regex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::command::docker_exec;
use crate::error::{ProbeError, Result};

static ROUTE_COUNT_RE: OnceLock<Regex> = OnceLock::new();

fn route_count_re() -> &'static Regex {
    ROUTE_COUNT_RE.get_or_init(|| {
        Regex::new(r"(\d+)\s+of\s+(\d+)\s+routes\s+for\s+(\d+)\s+networks").unwrap()
    })
}

/// Parse `birdc show route count`, e.g.
///
/// ```text
/// BIRD 1.6.3 ready.
/// 1000 of 1200 routes for 1000 networks
/// ```
pub fn parse_route_count(output: &str) -> Result<MonitorState> {
    let caps = route_count_re()
        .captures(output)
        .ok_or_else(|| ProbeError::parse("birdc route count", output.trim()))?;
    let num = |i: usize| {
        caps[i]
            .parse::<u64>()
            .map_err(|_| ProbeError::parse("birdc route count", &caps[0]))
    };
    Ok(MonitorState::Bird {
        routes_matching: num(1)?,
        routes_all: num(2)?,
        unique_networks: num(3)?,
    })
}

/// Parse `birdc show protocol <name>` and return the `info` column of the
/// protocol row (e.g. `Established`, `Connect`, `Active`).
///
/// ```text
/// BIRD 1.6.3 ready.
/// name     proto    table    state  since       info
/// bgp_1000 BGP      master   up     16:00:30    Established
/// ```
pub fn parse_protocol_info(output: &str) -> Option<String> {
    let mut lines = output.lines().skip(1);
    let header: Vec<&str> = lines.next()?.split_whitespace().collect();
    let row: Vec<&str> = lines.next()?.split_whitespace().collect();
    let info = header.iter().position(|h| *h == "info")?;
    // `since` may span two tokens (date and time); info is always last
    let extra = row.len().checked_sub(header.len())?;
    let value = row[info + extra..].join(" ");
    (!value.is_empty()).then_some(value)
}

#[derive(Debug, Clone)]
pub struct BirdMonitorProbe {
    container: String,
    checkpoints: Checkpoints,
}

impl BirdMonitorProbe {
    pub fn new(container: impl Into<String>, checkpoints: Checkpoints) -> Self {
        Self {
            container: container.into(),
            checkpoints,
        }
    }

    /// Block until the monitor's session toward `target_as` is established.
    pub async fn wait_established(
        &self,
        target_as: u32,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        let protocol = format!("bgp_{target_as}");
        let started = Instant::now();
        let mut last = String::from("unknown");
        loop {
            let args = ["birdc", "show", "protocol", protocol.as_str()];
            match docker_exec(&self.container, &args).await {
                Ok(output) => {
                    if let Some(state) = parse_protocol_info(&output) {
                        if state == "Established" {
                            info!(protocol = %protocol, "monitor session established");
                            return Ok(());
                        }
                        last = state;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "birdc not ready");
                    last = e.to_string();
                }
            }
            if started.elapsed() >= timeout {
                return Err(ProbeError::NotEstablished {
                    protocol,
                    seconds: timeout.as_secs(),
                    last,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl Probe for BirdMonitorProbe {
    type Error = ProbeError;

    fn name(&self) -> &str {
        &self.container
    }

    async fn poll(&mut self) -> Result<BusMessage> {
        let output = docker_exec(&self.container, &["birdc", "show", "route", "count"]).await?;
        let state = parse_route_count(&output)?;
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
    fn parses_route_count() {
        let out = "BIRD 1.6.3 ready.\n1000 of 1200 routes for 950 networks\n";
        assert_eq!(
            parse_route_count(out).unwrap(),
            MonitorState::Bird {
                routes_matching: 1000,
                routes_all: 1200,
                unique_networks: 950,
            }
        );
    }

    #[test]
    fn route_count_without_match_is_an_error() {
        assert!(parse_route_count("BIRD 1.6.3 ready.\nUnable to connect\n").is_err());
    }

    #[test]
    fn parses_protocol_info() {
        let out = "BIRD 1.6.3 ready.\n\
                   name     proto    table    state  since       info\n\
                   bgp_65534 BGP      table_65534 up     2017-03-01 16:00:30  Established\n";
        assert_eq!(parse_protocol_info(out).as_deref(), Some("Established"));

        let out = "BIRD 1.6.3 ready.\n\
                   name     proto    table    state  since       info\n\
                   bgp_1000 BGP      master   start  16:00:30    Connect\n";
        assert_eq!(parse_protocol_info(out).as_deref(), Some("Connect"));
    }

    #[test]
    fn protocol_info_missing_row() {
        assert_eq!(parse_protocol_info("BIRD 1.6.3 ready.\n"), None);
        assert_eq!(
            parse_protocol_info("BIRD ready.\nsyntax error\n"),
            None
        );
    }
}
