use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;

/// Port and measured connect latency of a successful probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLatency {
    pub port: u16,
    pub latency_ms: u64,
}

/// Attempt one TCP connect to `ip:port`, bounded by `timeout`.
///
/// Latency is wall-clock time from attempt start to connection
/// establishment. Refused, timed-out, and unreachable attempts all collapse
/// to `None`; no application-level handshake is performed.
pub async fn probe_port(ip: IpAddr, port: u16, timeout: Duration) -> Option<u64> {
    let addr = SocketAddr::new(ip, port);
    let start = Instant::now();
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Some(start.elapsed().as_millis() as u64),
        Ok(Err(e)) => {
            trace!(%addr, error = %e, "probe failed");
            None
        }
        Err(_) => {
            trace!(%addr, "probe timed out");
            None
        }
    }
}

/// Probe a candidate against a port fallback chain.
///
/// Ports are tried in configured order and the first successful connect
/// wins; remaining ports are skipped. Returns `None` when every port fails.
pub async fn probe_candidate(ip: IpAddr, ports: &[u16], timeout: Duration) -> Option<PortLatency> {
    for &port in ports {
        if let Some(latency_ms) = probe_port(ip, port, timeout).await {
            return Some(PortLatency { port, latency_ms });
        }
    }
    None
}
