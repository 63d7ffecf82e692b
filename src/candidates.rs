use anyhow::{Context, Result};
use ipnet::{IpNet, Ipv4Net};
use std::collections::{HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use tracing::debug;

use crate::types::Candidate;

/// Default number of host samples drawn from a single CIDR block.
pub const DEFAULT_CIDR_SAMPLES: usize = 10;

/// Supplies candidates to the scheduler in batches; an empty batch means the
/// pool is exhausted. Implementations are drained by a single dispatcher.
pub trait CandidateSource: Send {
    fn next_batch(&mut self, n: usize) -> Vec<Candidate>;
}

/// A pre-parsed, in-memory candidate pool consumed front to back.
#[derive(Debug, Default)]
pub struct StaticPool {
    queue: VecDeque<Candidate>,
}

impl StaticPool {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            queue: candidates.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl CandidateSource for StaticPool {
    fn next_batch(&mut self, n: usize) -> Vec<Candidate> {
        let take = n.min(self.queue.len());
        self.queue.drain(..take).collect()
    }
}

/// Parse a candidate list into a deduplicated candidate pool.
///
/// Supported forms per line:
/// - plain address: `104.16.1.7`
/// - address with port override: `104.16.1.7:2053`
/// - CIDR block: `104.16.0.0/13` (expanded to at most `cidr_samples` hosts,
///   strided across the block; network/broadcast excluded)
/// - comments: everything after `#` is ignored
/// - whitespace, blank lines, and lines that parse as none of the above are
///   skipped
///
/// Duplicate addresses collapse to their first occurrence.
pub fn parse_candidates_str(s: &str, cidr_samples: usize) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = Vec::new();
    let mut seen: HashSet<IpAddr> = HashSet::new();

    for raw_line in s.lines() {
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        if line.contains('/') {
            match line.parse::<IpNet>() {
                Ok(net) => {
                    for ip in sample_net_hosts(net, cidr_samples) {
                        if seen.insert(ip) {
                            out.push(Candidate::new(ip));
                        }
                    }
                }
                Err(e) => debug!(line, error = %e, "skipping unparseable CIDR line"),
            }
            continue;
        }

        if let Ok(ip) = line.parse::<IpAddr>() {
            if seen.insert(ip) {
                out.push(Candidate::new(ip));
            }
            continue;
        }

        // `ip:port` override form (IPv4 only; bare IPv6 parses above).
        if let Some((host, port)) = line.rsplit_once(':') {
            let parsed = (
                host.trim().parse::<Ipv4Addr>(),
                port.trim().parse::<u16>(),
            );
            if let (Ok(v4), Ok(p)) = parsed {
                if p > 0 {
                    let ip = IpAddr::V4(v4);
                    if seen.insert(ip) {
                        out.push(Candidate::with_port(ip, p));
                    }
                    continue;
                }
            }
        }

        debug!(line, "skipping unparseable candidate line");
    }

    out
}

/// Load a candidate list from a file path.
pub fn load_candidates_from_path(
    path: impl AsRef<Path>,
    cidr_samples: usize,
) -> Result<Vec<Candidate>> {
    let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
        format!(
            "failed to read candidate file: {}",
            path.as_ref().display()
        )
    })?;
    Ok(parse_candidates_str(&content, cidr_samples))
}

/// Draw up to `cap` host addresses from a network, strided evenly so samples
/// spread across the block instead of clustering at the front.
///
/// For IPv4, excludes the network and broadcast addresses. IPv6 blocks are
/// not sampled and return an empty list.
pub fn sample_net_hosts(net: IpNet, cap: usize) -> Vec<IpAddr> {
    match net {
        IpNet::V4(n4) => sample_ipv4_hosts(n4, cap)
            .into_iter()
            .map(IpAddr::V4)
            .collect(),
        IpNet::V6(_) => Vec::new(),
    }
}

fn sample_ipv4_hosts(net: Ipv4Net, cap: usize) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    if cap == 0 || end <= start + 1 {
        // Too small to have host addresses
        return Vec::new();
    }
    let hosts = (end - start - 1) as usize;
    let take = cap.min(hosts);
    let stride = (hosts / take).max(1) as u32;
    (0..take as u32)
        .map(|i| Ipv4Addr::from(start + 1 + i * stride))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_and_port_override() {
        let input = "1.2.3.4\n5.6.7.8:2053\n";
        let out = parse_candidates_str(input, DEFAULT_CIDR_SAMPLES);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Candidate::new("1.2.3.4".parse().unwrap()));
        assert_eq!(
            out[1],
            Candidate::with_port("5.6.7.8".parse().unwrap(), 2053)
        );
    }

    #[test]
    fn parse_dedups_first_occurrence_wins() {
        let input = "1.2.3.4:443\n1.2.3.4\n1.2.3.4:8443\n";
        let out = parse_candidates_str(input, DEFAULT_CIDR_SAMPLES);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].port, Some(443));
    }

    #[test]
    fn parse_skips_comments_and_garbage() {
        let input = r#"
            # relay pool
            1.2.3.4   # primary
            not-an-ip
            300.1.1.1
        "#;
        let out = parse_candidates_str(input, DEFAULT_CIDR_SAMPLES);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn cidr_expansion_capped_and_strided() {
        let out = parse_candidates_str("10.0.0.0/24\n", 4);
        assert_eq!(out.len(), 4);
        // 254 hosts / 4 samples -> stride 63, starting at .1
        let ips: Vec<String> = out.iter().map(|c| c.ip.to_string()).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.64", "10.0.0.127", "10.0.0.190"]);
    }

    #[test]
    fn small_cidr_excludes_network_and_broadcast() {
        let net: Ipv4Net = "192.168.1.0/30".parse().unwrap();
        let hosts = sample_ipv4_hosts(net, 16);
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2)]
        );
    }

    #[test]
    fn ipv6_blocks_not_sampled() {
        let out = parse_candidates_str("2001:db8::/64\n", 8);
        assert!(out.is_empty());
    }

    #[test]
    fn static_pool_drains_in_order() {
        let mut pool = StaticPool::new(parse_candidates_str("1.1.1.1\n2.2.2.2\n3.3.3.3\n", 1));
        assert_eq!(pool.remaining(), 3);
        let batch = pool.next_batch(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].ip.to_string(), "1.1.1.1");
        assert_eq!(pool.next_batch(5).len(), 1);
        assert!(pool.next_batch(5).is_empty());
    }
}
