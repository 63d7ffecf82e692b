use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

/// Maps an address to an ISO 3166 country code; `None` means unknown.
///
/// Implementations may be slow (a network-backed resolver is legal), so the
/// scheduler only calls `resolve` from worker tasks, never while holding a
/// bookkeeping lock.
pub trait CountryResolver: Send + Sync {
    fn resolve(&self, ip: IpAddr) -> Option<String>;
}

/// Exact-match address-to-country table loaded from a flat file.
#[derive(Debug, Default)]
pub struct GeoTable {
    entries: HashMap<IpAddr, String>,
}

impl GeoTable {
    pub fn from_entries(entries: impl IntoIterator<Item = (IpAddr, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `address country-code` lines. Comments (`#`) and blank lines are
    /// ignored; malformed lines are an error with the offending line number.
    pub fn parse_str(s: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        for (idx, raw_line) in s.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (ip_str, cc) = match (fields.next(), fields.next()) {
                (Some(ip), Some(cc)) => (ip, cc),
                _ => bail!("line {line_no}: expected `address country-code`"),
            };
            let ip: IpAddr = ip_str
                .parse()
                .with_context(|| format!("line {line_no}: invalid address: {ip_str}"))?;
            let cc = cc.to_ascii_uppercase();
            if cc.len() != 2 || !cc.bytes().all(|b| b.is_ascii_alphabetic()) {
                bail!("line {line_no}: invalid country code: {cc}");
            }
            entries.insert(ip, cc);
        }
        Ok(Self { entries })
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read geo table: {}", path.as_ref().display()))?;
        Self::parse_str(&content)
    }
}

impl CountryResolver for GeoTable {
    fn resolve(&self, ip: IpAddr) -> Option<String> {
        self.entries.get(&ip).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_resolve() {
        let table = GeoTable::parse_str("1.1.1.1 us\n8.8.8.8 US # comment\n\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("1.1.1.1".parse().unwrap()).as_deref(), Some("US"));
        assert_eq!(table.resolve("9.9.9.9".parse().unwrap()), None);
    }

    #[test]
    fn malformed_line_is_error() {
        assert!(GeoTable::parse_str("1.1.1.1\n").is_err());
        assert!(GeoTable::parse_str("1.1.1.1 usa\n").is_err());
        assert!(GeoTable::parse_str("nope US\n").is_err());
    }
}
