use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-country acceptance counters with fixed targets.
///
/// The tracked country set is fixed at construction, so lookups need no lock;
/// each counter is bumped with a bounded compare-exchange, which makes
/// `record` atomic under concurrent callers: exactly one caller wins the
/// last slot of a country.
#[derive(Debug)]
pub struct QuotaTracker {
    quotas: HashMap<String, CountryQuota>,
}

#[derive(Debug)]
struct CountryQuota {
    target: usize,
    accepted: AtomicUsize,
}

impl QuotaTracker {
    pub fn new(counts: &HashMap<String, usize>) -> Self {
        let quotas = counts
            .iter()
            .map(|(cc, &target)| {
                (
                    cc.clone(),
                    CountryQuota {
                        target,
                        accepted: AtomicUsize::new(0),
                    },
                )
            })
            .collect();
        Self { quotas }
    }

    /// Claim one slot for `country`. Returns `false` when the country is not
    /// tracked or its quota is already full.
    pub fn record(&self, country: &str) -> bool {
        let Some(q) = self.quotas.get(country) else {
            return false;
        };
        q.accepted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < q.target).then_some(n + 1)
            })
            .is_ok()
    }

    pub fn is_tracked(&self, country: &str) -> bool {
        self.quotas.contains_key(country)
    }

    /// A country with no quota has nothing outstanding and reads as satisfied.
    pub fn is_country_satisfied(&self, country: &str) -> bool {
        self.quotas
            .get(country)
            .map_or(true, |q| q.accepted.load(Ordering::Acquire) >= q.target)
    }

    pub fn is_all_satisfied(&self) -> bool {
        self.quotas
            .values()
            .all(|q| q.accepted.load(Ordering::Acquire) >= q.target)
    }

    pub fn accepted(&self, country: &str) -> usize {
        self.quotas
            .get(country)
            .map_or(0, |q| q.accepted.load(Ordering::Acquire))
    }

    /// Snapshot of `(accepted, target)` per country, ordered by country code.
    pub fn progress(&self) -> BTreeMap<String, (usize, usize)> {
        self.quotas
            .iter()
            .map(|(cc, q)| (cc.clone(), (q.accepted.load(Ordering::Acquire), q.target)))
            .collect()
    }
}
