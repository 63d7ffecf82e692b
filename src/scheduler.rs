use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ::time::{format_description::well_known, OffsetDateTime};
use anyhow::{bail, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::candidates::CandidateSource;
use crate::config::RunConfig;
use crate::geo::CountryResolver;
use crate::prober;
use crate::quota::QuotaTracker;
use crate::store::ResultStore;
use crate::types::{ProbeReport, ProbeResult, StopReason};

/// Run the probing engine over `source` until every country quota is
/// satisfied, the pool is exhausted, or the scan cap is reached.
///
/// - Limits concurrent connect attempts with a `Semaphore`.
/// - Routes each reachable candidate through `resolver` and the per-country
///   quota before it lands in a latency-sorted bucket.
/// - Signals a global stop via `CancellationToken` the moment the last quota
///   fills; in-flight probes finish naturally, no new ones start.
pub async fn run_probe_scan(
    source: &mut dyn CandidateSource,
    resolver: Arc<dyn CountryResolver>,
    config: &RunConfig,
) -> Result<ProbeReport> {
    run_probe_scan_internal(source, resolver, config, None, None).await
}

/// Variant that accepts a `CancellationToken` for external cancellation.
pub async fn run_probe_scan_with_cancel(
    source: &mut dyn CandidateSource,
    resolver: Arc<dyn CountryResolver>,
    config: &RunConfig,
    cancel: CancellationToken,
) -> Result<ProbeReport> {
    run_probe_scan_internal(source, resolver, config, Some(cancel), None).await
}

/// Variant that additionally shares live progress counters with a caller
/// (e.g. the status server).
pub async fn run_probe_scan_with_shared(
    source: &mut dyn CandidateSource,
    resolver: Arc<dyn CountryResolver>,
    config: &RunConfig,
    cancel: CancellationToken,
    progress: RunProgress,
) -> Result<ProbeReport> {
    run_probe_scan_internal(source, resolver, config, Some(cancel), Some(progress)).await
}

/// Live counters for a run in flight.
#[derive(Clone, Debug)]
pub struct RunProgress {
    pub scanned: Arc<AtomicU64>,
    pub accepted: Arc<AtomicU64>,
    pub rejected: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
}

impl RunProgress {
    pub fn new() -> Self {
        Self {
            scanned: Arc::new(AtomicU64::new(0)),
            accepted: Arc::new(AtomicU64::new(0)),
            rejected: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_probe_scan_internal(
    source: &mut dyn CandidateSource,
    resolver: Arc<dyn CountryResolver>,
    config: &RunConfig,
    cancel_opt: Option<CancellationToken>,
    progress_opt: Option<RunProgress>,
) -> Result<ProbeReport> {
    config.validate()?;

    let cancel = cancel_opt.unwrap_or_default();
    let progress = progress_opt.unwrap_or_default();
    let quota = Arc::new(QuotaTracker::new(&config.counts));
    let store = Arc::new(ResultStore::new(config.counts.clone()));
    let sem = Arc::new(Semaphore::new(config.max_concurrent));
    let ports: Arc<Vec<u16>> = Arc::new(config.ports.clone());
    let timeout = config.timeout;
    let max_latency_ms = config.max_latency_ms;

    let mut set = JoinSet::new();
    let mut dispatched: usize = 0;
    let mut cap_reached = false;
    let mut pool_exhausted = false;

    'dispatch: while !cancel.is_cancelled() {
        let want = if config.max_candidates > 0 {
            let left = config.max_candidates - dispatched;
            if left == 0 {
                cap_reached = true;
                break;
            }
            config.max_concurrent.min(left)
        } else {
            config.max_concurrent
        };

        let batch = source.next_batch(want);
        if batch.is_empty() {
            if dispatched == 0 {
                bail!("candidate source produced no candidates");
            }
            pool_exhausted = true;
            break;
        }

        for cand in batch {
            if cancel.is_cancelled() {
                break 'dispatch;
            }
            let permit = sem
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore in scope");
            dispatched += 1;

            let resolver = resolver.clone();
            let quota = quota.clone();
            let store = store.clone();
            let cancel = cancel.clone();
            let progress = progress.clone();
            let ports = ports.clone();

            set.spawn(async move {
                let _permit = permit; // keep permit until the probe completes

                if cancel.is_cancelled() {
                    return;
                }

                let outcome = match cand.port {
                    Some(p) => prober::probe_candidate(cand.ip, &[p], timeout).await,
                    None => prober::probe_candidate(cand.ip, &ports, timeout).await,
                };

                match outcome {
                    Some(hit) if max_latency_ms > 0 && hit.latency_ms > max_latency_ms => {
                        debug!(ip = %cand.ip, latency_ms = hit.latency_ms, "over latency ceiling");
                        progress.failed.fetch_add(1, Ordering::Relaxed);
                    }
                    Some(hit) => match resolver.resolve(cand.ip) {
                        Some(country) if quota.record(&country) => {
                            let entry = ProbeResult {
                                ip: cand.ip.to_string(),
                                port: hit.port,
                                latency_ms: hit.latency_ms,
                                country: country.clone(),
                                timestamp: now_rfc3339(),
                            };
                            if !store.insert(entry) {
                                // Candidates are deduplicated upstream, so a
                                // claimed quota slot always has bucket room.
                                warn!(ip = %cand.ip, %country, "accepted result not stored");
                            }
                            progress.accepted.fetch_add(1, Ordering::Relaxed);
                            debug!(ip = %cand.ip, %country, latency_ms = hit.latency_ms, "accepted");
                            if quota.is_all_satisfied() {
                                info!("all country quotas satisfied, stopping dispatch");
                                cancel.cancel();
                            }
                        }
                        _ => {
                            // Unknown country or quota already full.
                            progress.rejected.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    None => {
                        progress.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }

                progress.scanned.fetch_add(1, Ordering::Relaxed);
            });
        }
    }

    // Let in-flight probes resolve; stop only blocks new dispatch.
    while set.join_next().await.is_some() {}

    let stop_reason = if quota.is_all_satisfied() {
        StopReason::QuotasSatisfied
    } else if cancel.is_cancelled() {
        StopReason::Cancelled
    } else if cap_reached {
        StopReason::ScanCapReached
    } else {
        debug_assert!(pool_exhausted);
        StopReason::PoolExhausted
    };

    Ok(ProbeReport {
        scanned: progress.scanned.load(Ordering::Relaxed),
        accepted: progress.accepted.load(Ordering::Relaxed),
        rejected: progress.rejected.load(Ordering::Relaxed),
        failed: progress.failed.load(Ordering::Relaxed),
        stop_reason,
        buckets: store.snapshot(),
    })
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
