use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Immutable configuration for one probing run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Target country codes, upper-case, deduplicated.
    pub countries: Vec<String>,
    /// Target result count per country; every entry in `countries` has one.
    pub counts: HashMap<String, usize>,
    /// Port fallback chain tried in order; first successful connect wins.
    pub ports: Vec<u16>,
    /// Upper bound on simultaneously in-flight probes.
    pub max_concurrent: usize,
    /// Per-probe connect timeout.
    pub timeout: Duration,
    /// Stop after dispatching this many candidates (0 = unbounded).
    pub max_candidates: usize,
    /// Discard results slower than this many milliseconds (0 = disabled).
    pub max_latency_ms: u64,
}

impl RunConfig {
    /// Check the preconditions a run must hold before any probing starts.
    pub fn validate(&self) -> Result<()> {
        if self.countries.is_empty() {
            bail!("no target countries configured");
        }
        for country in &self.countries {
            match self.counts.get(country) {
                Some(0) => bail!("target country {country} has a zero quota"),
                Some(_) => {}
                None => bail!("target country {country} has no configured count"),
            }
        }
        if self.ports.is_empty() {
            bail!("no probe ports configured");
        }
        if self.max_concurrent == 0 {
            bail!("max_concurrent must be at least 1");
        }
        if self.timeout.is_zero() {
            bail!("probe timeout must be non-zero");
        }
        Ok(())
    }
}

/// Parse a comma-separated country list (`us,hk, jp`) into upper-case codes.
/// Duplicates are removed, first appearance wins.
pub fn parse_countries_arg(s: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for raw in s.split(',') {
        let code = raw.trim().to_ascii_uppercase();
        if code.is_empty() {
            continue;
        }
        if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
            bail!("invalid country code: {code}");
        }
        if seen.insert(code.clone()) {
            out.push(code);
        }
    }
    if out.is_empty() {
        bail!("country list is empty");
    }
    Ok(out)
}

/// Parse a comma-separated counts list and zip it with the country list.
/// The two lists must have the same length.
pub fn parse_counts_arg(countries: &[String], s: &str) -> Result<HashMap<String, usize>> {
    let mut counts = Vec::new();
    for raw in s.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let n: usize = raw
            .parse()
            .with_context(|| format!("invalid count value: {raw}"))?;
        counts.push(n);
    }
    if counts.len() != countries.len() {
        bail!(
            "country and count lists differ in length ({} vs {})",
            countries.len(),
            counts.len()
        );
    }
    Ok(countries.iter().cloned().zip(counts).collect())
}

/// Parse a comma-separated port list (`443,8443`) into a deduplicated chain,
/// preserving the configured fallback order.
pub fn parse_ports_arg(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for raw in s.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let val: u32 = raw
            .parse()
            .with_context(|| format!("invalid port value: {raw}"))?;
        if val == 0 || val > 65535 {
            bail!("port out of range: {val}");
        }
        let p = val as u16;
        if seen.insert(p) {
            out.push(p);
        }
    }
    if out.is_empty() {
        bail!("port list is empty");
    }
    Ok(out)
}
