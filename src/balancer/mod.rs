//! Self-healing load balancer
//!
//! Owns the composite engine instance serving client traffic. Backends are
//! found by probing the availableConfigs pool in latency order; a health
//! loop rebuilds the pool whenever every backend has gone unhealthy.
//!
//! State machine: Idle -> Starting -> Running -> Degraded -> Rebuilding ->
//! Running, and Stopping -> Idle on shutdown.

mod assemble;
mod obfuscate;

pub use assemble::build_balanced_config;
pub use obfuscate::SniRotator;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use crate::bench::Benchmarker;
use crate::callbacks::{EngineHandle, ProxyEngine};
use crate::models::{now_ts, Backend, BalancerPhase, BalancerStats, SeedEntry};

/// Probe URL used when qualifying backends
const PROBE_URL: &str = "https://cp.cloudflare.com/";
/// Per-backend probe timeout
const PROBE_TIMEOUT_SECS: u64 = 8;
/// Grace period after engine start before the listener is assumed up
const LISTEN_GRACE: Duration = Duration::from_millis(1500);

/// Balancer construction parameters
#[derive(Debug, Clone)]
pub struct BalancerOptions {
    pub listen_port: u16,
    pub desired_backends: usize,
    pub health_interval: Duration,
    pub fragment_enabled: bool,
}

struct State {
    phase: BalancerPhase,
    handle: Option<EngineHandle>,
    backends: Vec<Backend>,
    available: Vec<SeedEntry>,
    failed: HashSet<String>,
    stats: BalancerStats,
}

impl State {
    fn new() -> Self {
        State {
            phase: BalancerPhase::Idle,
            handle: None,
            backends: Vec::new(),
            available: Vec::new(),
            failed: HashSet::new(),
            stats: BalancerStats::default(),
        }
    }

    fn running(&self) -> bool {
        !matches!(self.phase, BalancerPhase::Idle | BalancerPhase::Stopping)
    }

    fn healthy_count(&self) -> usize {
        self.backends.iter().filter(|b| b.healthy).count()
    }
}

/// Maintains N healthy backends behind one SOCKS listener
pub struct Balancer {
    opts: BalancerOptions,
    engine: Arc<dyn ProxyEngine>,
    bench: Arc<Benchmarker>,
    obfuscator: Option<Arc<SniRotator>>,
    state: Mutex<State>,
    /// Serializes rebuilds; no two concurrent engine restarts
    rebuild_lock: tokio::sync::Mutex<()>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl Balancer {
    pub fn new(
        opts: BalancerOptions,
        engine: Arc<dyn ProxyEngine>,
        bench: Arc<Benchmarker>,
        obfuscator: Option<Arc<SniRotator>>,
    ) -> Self {
        Balancer {
            opts,
            engine,
            bench,
            obfuscator,
            state: Mutex::new(State::new()),
            rebuild_lock: tokio::sync::Mutex::new(()),
            shutdown_tx: Mutex::new(None),
            health_task: Mutex::new(None),
        }
    }

    pub fn listen_port(&self) -> u16 {
        self.opts.listen_port
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running()
    }

    /// Start the balancer, optionally warm-started from a persisted seed.
    ///
    /// Probes the seed synchronously, brings the engine up if anything
    /// passed, then launches the background health loop.
    #[instrument(skip(self, seed), fields(port = self.opts.listen_port))]
    pub async fn start(self: Arc<Self>, seed: Option<Vec<SeedEntry>>) {
        {
            let mut st = self.state.lock();
            if st.running() {
                return;
            }
            st.phase = BalancerPhase::Starting;
            if let Some(seed) = seed {
                st.available = seed;
            }
        }
        info!(
            "Starting balancer with {} backend slots",
            self.opts.desired_backends
        );

        {
            let _guard = self.rebuild_lock.lock().await;
            let backends = self.find_working_backends(self.opts.desired_backends).await;
            if backends.is_empty() {
                warn!("No working backends at startup, waiting for fresh configs");
                self.state.lock().phase = BalancerPhase::Degraded;
            } else {
                self.state.lock().backends = backends.clone();
                let ok = self.build_and_start(&backends).await;
                self.state.lock().phase = if ok {
                    BalancerPhase::Running
                } else {
                    BalancerPhase::Degraded
                };
            }
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown_tx.lock() = Some(tx);
        let this = Arc::clone(&self);
        *self.health_task.lock() = Some(tokio::spawn(async move {
            this.health_loop(rx).await;
        }));
    }

    /// Replace the available config pool.
    ///
    /// When the balancer is running with an empty backend set, a rebuild is
    /// attempted immediately on the caller's task.
    pub async fn update_available(&self, seed: Vec<SeedEntry>) {
        let needs_rebuild = {
            let mut st = self.state.lock();
            st.available = seed;
            // Fresh pool: previously failed URIs get another chance
            st.failed.clear();
            st.running() && st.backends.is_empty()
        };
        debug!(
            "Config pool updated: {} entries",
            self.state.lock().available.len()
        );

        if needs_rebuild {
            self.rebuild().await;
        }
    }

    /// Stop the health loop and the engine instance
    pub async fn stop(&self) {
        {
            let mut st = self.state.lock();
            if !st.running() {
                return;
            }
            st.phase = BalancerPhase::Stopping;
        }

        let tx = self.shutdown_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(true);
        }
        let task = self.health_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let handle = self.state.lock().handle.take();
        if let Some(handle) = handle {
            self.engine.stop_proxy(handle).await;
        }

        self.state.lock().phase = BalancerPhase::Idle;
        info!("Balancer stopped");
    }

    /// Snapshot of running state and counters
    pub fn status(&self) -> Value {
        let st = self.state.lock();
        json!({
            "running": st.running(),
            "phase": st.phase.as_str(),
            "port": self.opts.listen_port,
            "backends": st.healthy_count(),
            "total_backends": st.backends.len(),
            "available_pool": st.available.len(),
            "stats": {
                "restarts": st.stats.restarts,
                "health_checks": st.stats.health_checks,
                "backend_swaps": st.stats.backend_swaps,
                "last_restart": st.stats.last_restart,
            },
        })
    }

    pub fn stats(&self) -> BalancerStats {
        self.state.lock().stats.clone()
    }

    pub fn backends(&self) -> Vec<Backend> {
        self.state.lock().backends.clone()
    }

    /// Current engine handle, if one is live
    pub fn engine_handle(&self) -> Option<EngineHandle> {
        self.state.lock().handle
    }

    // ---------- internals ----------

    /// Deterministic per-URI probe port away from the service listener
    fn probe_port(&self, uri: &str) -> u16 {
        let mut hasher = DefaultHasher::new();
        uri.hash(&mut hasher);
        self.opts.listen_port + 100 + (hasher.finish() % 50) as u16
    }

    async fn probe_backend(&self, uri: &str) -> Option<f64> {
        let parsed = crate::parser::parse(uri)?;
        self.bench
            .benchmark(&parsed, self.probe_port(uri), PROBE_URL, PROBE_TIMEOUT_SECS)
            .await
    }

    /// Probe the pool in latency order until `count` backends pass.
    ///
    /// URIs that fail the probe enter the sticky failed set and are skipped
    /// until the next pool refresh.
    async fn find_working_backends(&self, count: usize) -> Vec<Backend> {
        let mut candidates = {
            let st = self.state.lock();
            st.available.clone()
        };
        candidates.sort_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms));

        let mut working = Vec::new();
        for entry in candidates {
            if working.len() >= count {
                break;
            }
            if self.state.lock().failed.contains(&entry.uri) {
                continue;
            }

            match self.probe_backend(&entry.uri).await {
                Some(latency) => {
                    debug!("Backend {} passed at {:.0}ms", working.len() + 1, latency);
                    working.push(Backend {
                        uri: entry.uri,
                        latency,
                        healthy: true,
                        added_at: now_ts(),
                    });
                }
                None => {
                    self.state.lock().failed.insert(entry.uri);
                }
            }
        }
        working
    }

    /// Stop any prior engine instance and start one for `backends`.
    ///
    /// The balancer holds at most one live engine handle at any instant.
    async fn build_and_start(&self, backends: &[Backend]) -> bool {
        let old = self.state.lock().handle.take();
        if let Some(handle) = old {
            self.engine.stop_proxy(handle).await;
        }

        if let Some(rotator) = &self.obfuscator {
            rotator.rotate();
        }
        let config = build_balanced_config(
            self.opts.listen_port,
            backends,
            self.obfuscator.as_deref(),
            self.opts.fragment_enabled,
        );

        let handle = self
            .engine
            .start_proxy(&config.to_string(), self.opts.listen_port)
            .await;
        if handle < 0 {
            warn!(
                "Engine failed to start balancer on port {}",
                self.opts.listen_port
            );
            return false;
        }

        tokio::time::sleep(LISTEN_GRACE).await;
        {
            let mut st = self.state.lock();
            st.handle = Some(handle);
            st.stats.restarts += 1;
            st.stats.last_restart = Some(now_ts());
        }
        info!(
            "Balancer serving on port {} with {} backends",
            self.opts.listen_port,
            backends.len()
        );
        true
    }

    /// Find fresh backends and swap them in, serialized with other rebuilds
    async fn rebuild(&self) {
        let _guard = self.rebuild_lock.lock().await;
        self.state.lock().phase = BalancerPhase::Rebuilding;

        let backends = self.find_working_backends(self.opts.desired_backends).await;
        if backends.is_empty() {
            warn!("Rebuild found no working backends");
            self.state.lock().phase = BalancerPhase::Degraded;
            return;
        }

        self.state.lock().backends = backends.clone();
        let ok = self.build_and_start(&backends).await;
        let mut st = self.state.lock();
        if ok {
            st.stats.backend_swaps += 1;
            st.phase = BalancerPhase::Running;
        } else {
            st.phase = BalancerPhase::Degraded;
        }
    }

    #[instrument(skip(self, shutdown), fields(port = self.opts.listen_port))]
    async fn health_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Health monitor started (interval: {}s)",
            self.opts.health_interval.as_secs()
        );
        let mut ticker = interval(self.opts.health_interval);
        ticker.tick().await; // immediate tick is skipped

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.health_tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn health_tick(&self) {
        let (healthy, pool_empty) = {
            let mut st = self.state.lock();
            st.stats.health_checks += 1;
            (st.healthy_count(), st.available.is_empty())
        };

        if healthy > 0 {
            debug!("Health check: {} healthy backends", healthy);
            return;
        }
        if pool_empty {
            debug!("Health check: pool exhausted and no configs available");
            return;
        }

        warn!("No healthy backends, rebuilding");
        self.state.lock().phase = BalancerPhase::Degraded;
        self.rebuild().await;
    }

    #[cfg(test)]
    pub(crate) fn set_backends_health(&self, healthy: bool) {
        for backend in self.state.lock().backends.iter_mut() {
            backend.healthy = healthy;
        }
    }
}
