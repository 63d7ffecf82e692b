use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// One candidate address pending a reachability probe.
///
/// `port` carries a per-candidate override parsed from an `ip:port` source
/// line; when `None` the run's configured port chain applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub ip: IpAddr,
    pub port: Option<u16>,
}

impl Candidate {
    pub fn new(ip: IpAddr) -> Self {
        Self { ip, port: None }
    }

    pub fn with_port(ip: IpAddr, port: u16) -> Self {
        Self { ip, port: Some(port) }
    }
}

/// One accepted probe measurement for an address.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub ip: String,
    pub port: u16,
    pub latency_ms: u64,
    pub country: String,
    pub timestamp: String,
}

impl ProbeResult {
    /// Render in the relay-list line format consumed by downstream tooling,
    /// e.g. `104.16.1.7:8443#US 42ms`.
    pub fn display_line(&self) -> String {
        format!(
            "{}:{}#{} {}ms",
            self.ip, self.port, self.country, self.latency_ms
        )
    }
}

/// Why a run stopped issuing new probes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every target country reached its quota.
    QuotasSatisfied,
    /// The candidate source ran dry before all quotas were met.
    #[default]
    PoolExhausted,
    /// The configured scan cap truncated the run.
    ScanCapReached,
    /// An external cancellation (Ctrl-C, server restart) ended the run.
    Cancelled,
}

/// Aggregate outcome of one probing run: progress counters, the reason the
/// run ended, and the final per-country buckets sorted by latency.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProbeReport {
    pub scanned: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
    pub stop_reason: StopReason,
    pub buckets: BTreeMap<String, Vec<ProbeResult>>,
}

impl ProbeReport {
    /// Total accepted entries across all country buckets.
    pub fn total_accepted(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_line_format() {
        let r = ProbeResult {
            ip: "104.16.1.7".into(),
            port: 8443,
            latency_ms: 42,
            country: "US".into(),
            timestamp: "2025-01-01T00:00:00Z".into(),
        };
        assert_eq!(r.display_line(), "104.16.1.7:8443#US 42ms");
    }

    #[test]
    fn report_counts_all_buckets() {
        let mut report = ProbeReport::default();
        report.buckets.insert(
            "US".into(),
            vec![ProbeResult {
                ip: "1.1.1.1".into(),
                port: 443,
                latency_ms: 10,
                country: "US".into(),
                timestamp: String::new(),
            }],
        );
        assert_eq!(report.total_accepted(), 1);
    }
}
