//! Parallel validation pipeline
//!
//! Deduplicates, prioritizes, and benchmarks a batch of candidate URIs
//! with a bounded worker pool over a shared port pool.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::callbacks::EventSink;
use crate::models::BenchResult;
use crate::prioritize::prioritize;

use super::{Benchmarker, PortPool};

/// Hard ceiling on worker count regardless of configuration
const WORKER_CAP: usize = 200;
/// Progress events fire every this many completions
const PROGRESS_STRIDE: usize = 10;

/// Knobs for one validation run
pub struct ValidatorParams {
    pub max_workers: usize,
    pub max_total: usize,
    /// First port of the benchmark port pool
    pub base_port: u16,
    pub probe_url: String,
    pub timeout_secs: u64,
}

/// Benchmark a batch of URIs, returning survivors sorted by latency.
///
/// URIs are deduplicated (keeping first occurrence), capped at
/// `max_total`, prioritized, then probed by `min(max_workers, 200, |work|)`
/// workers sharing a port pool of the same size. The shutdown signal is
/// honored at worker dequeue points.
pub async fn validate_uris(
    benchmarker: &Benchmarker,
    uris: &[String],
    params: &ValidatorParams,
    events: &Arc<dyn EventSink>,
    shutdown: &watch::Receiver<bool>,
) -> Vec<BenchResult> {
    let mut seen = HashSet::new();
    let deduped: Vec<String> = uris
        .iter()
        .filter(|uri| seen.insert((*uri).clone()))
        .take(params.max_total)
        .cloned()
        .collect();

    if deduped.is_empty() {
        info!("No configs to validate");
        return Vec::new();
    }

    let work = prioritize(&deduped);
    info!("Prioritized {} configs for validation", work.len());
    if work.is_empty() {
        return Vec::new();
    }

    let workers = params
        .max_workers
        .clamp(1, WORKER_CAP)
        .min(work.len());
    let pool = PortPool::new(params.base_port, workers);
    let total = work.len();
    let completed = AtomicUsize::new(0);
    let results: Mutex<Vec<BenchResult>> = Mutex::new(Vec::new());

    futures::stream::iter(work)
        .map(|uri| {
            let pool = pool.clone();
            let completed = &completed;
            let results = &results;
            let shutdown = shutdown.clone();
            async move {
                if *shutdown.borrow() {
                    return;
                }
                if let Some(result) = bench_one(benchmarker, &uri, &pool, params).await {
                    results.lock().push(result);
                }
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % PROGRESS_STRIDE == 0 {
                    events.on_progress("validating", done, total);
                }
            }
        })
        .buffer_unordered(workers)
        .collect::<()>()
        .await;

    let mut results = results.into_inner();
    results.sort_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms));
    info!("Validation complete: {}/{} passed", results.len(), total);
    results
}

async fn bench_one(
    benchmarker: &Benchmarker,
    uri: &str,
    pool: &PortPool,
    params: &ValidatorParams,
) -> Option<BenchResult> {
    let parsed = crate::parser::parse(uri)?;

    let lease = match pool.checkout().await {
        Ok(lease) => lease,
        Err(e) => {
            debug!("Port checkout failed: {}", e);
            return None;
        }
    };

    let latency = benchmarker
        .benchmark(&parsed, lease.port(), &params.probe_url, params.timeout_secs)
        .await?;
    drop(lease);

    Some(benchmarker.create_result(parsed, latency).await)
}
