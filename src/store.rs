use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::types::ProbeResult;

/// Country-bucketed collection of accepted results.
///
/// Each bucket stays sorted ascending by latency; equal latencies keep
/// arrival order. Bucket capacity is the country's quota, and no bucket ever
/// holds two entries for the same address. Inserts take a single short lock
/// and never block on I/O.
#[derive(Debug)]
pub struct ResultStore {
    caps: HashMap<String, usize>,
    buckets: Mutex<HashMap<String, Vec<ProbeResult>>>,
}

impl ResultStore {
    pub fn new(caps: HashMap<String, usize>) -> Self {
        Self {
            caps,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Insert an accepted result into its country bucket, keeping the bucket
    /// sorted. Returns `false` when the country has no bucket capacity, the
    /// bucket is full, or the address is already present.
    pub fn insert(&self, result: ProbeResult) -> bool {
        let Some(&cap) = self.caps.get(&result.country) else {
            return false;
        };
        let mut buckets = self.buckets.lock().expect("result store lock poisoned");
        let bucket = buckets.entry(result.country.clone()).or_default();
        if bucket.len() >= cap {
            return false;
        }
        if bucket.iter().any(|e| e.ip == result.ip) {
            return false;
        }
        // Upper-bound position: equal latencies keep arrival order.
        let idx = bucket.partition_point(|e| e.latency_ms <= result.latency_ms);
        bucket.insert(idx, result);
        true
    }

    /// Stable snapshot of the buckets, ordered by country code.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<ProbeResult>> {
        let buckets = self.buckets.lock().expect("result store lock poisoned");
        buckets
            .iter()
            .map(|(cc, v)| (cc.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ip: &str, latency_ms: u64, country: &str) -> ProbeResult {
        ProbeResult {
            ip: ip.to_string(),
            port: 443,
            latency_ms,
            country: country.to_string(),
            timestamp: String::new(),
        }
    }

    fn store(pairs: &[(&str, usize)]) -> ResultStore {
        ResultStore::new(pairs.iter().map(|(cc, n)| (cc.to_string(), *n)).collect())
    }

    #[test]
    fn inserts_stay_sorted_by_latency() {
        let s = store(&[("US", 10)]);
        assert!(s.insert(entry("1.1.1.1", 50, "US")));
        assert!(s.insert(entry("2.2.2.2", 20, "US")));
        assert!(s.insert(entry("3.3.3.3", 35, "US")));
        let buckets = s.snapshot();
        let latencies: Vec<u64> = buckets["US"].iter().map(|e| e.latency_ms).collect();
        assert_eq!(latencies, vec![20, 35, 50]);
    }

    #[test]
    fn equal_latency_keeps_arrival_order() {
        let s = store(&[("US", 10)]);
        assert!(s.insert(entry("1.1.1.1", 30, "US")));
        assert!(s.insert(entry("2.2.2.2", 30, "US")));
        let buckets = s.snapshot();
        let ips: Vec<&str> = buckets["US"].iter().map(|e| e.ip.as_str()).collect();
        assert_eq!(ips, vec!["1.1.1.1", "2.2.2.2"]);
    }

    #[test]
    fn full_bucket_rejects() {
        let s = store(&[("US", 2)]);
        assert!(s.insert(entry("1.1.1.1", 10, "US")));
        assert!(s.insert(entry("2.2.2.2", 20, "US")));
        assert!(!s.insert(entry("3.3.3.3", 5, "US")));
        assert_eq!(s.snapshot()["US"].len(), 2);
    }

    #[test]
    fn duplicate_address_rejected() {
        let s = store(&[("US", 5)]);
        assert!(s.insert(entry("1.1.1.1", 10, "US")));
        assert!(!s.insert(entry("1.1.1.1", 5, "US")));
    }

    #[test]
    fn unknown_country_rejected() {
        let s = store(&[("US", 5)]);
        assert!(!s.insert(entry("1.1.1.1", 10, "JP")));
        assert!(s.snapshot().is_empty());
    }
}
