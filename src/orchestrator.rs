//! Cycle orchestration
//!
//! Drives the scrape -> cache -> validate -> tier -> balance -> report
//! pipeline, owns the long-lived autonomous loop, and persists balancer
//! seeds across restarts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::balancer::{Balancer, BalancerOptions, SniRotator};
use crate::bench::{validate_uris, Benchmarker, ValidatorParams};
use crate::cache::{load_seed, save_seed, write_lines, CacheStore};
use crate::callbacks::Callbacks;
use crate::error::Result;
use crate::models::{now_ts, BenchResult, SeedEntry, Tier};
use crate::report::Reporter;
use crate::settings::Settings;
use crate::sources::{
    ChannelScraper, SourceFetcher, ANTI_CENSORSHIP_BANK, GENERAL_BANK, REGION_PRIORITY_BANK,
    SUBSCRIPTION_BANK,
};

/// Gold entries kept per cycle
const GOLD_CAP: usize = 100;
/// Silver entries kept per cycle
const SILVER_CAP: usize = 200;
/// Harvests below this size are topped up from cache and extra sources
const THIN_HARVEST: usize = 500;
/// Lines per reported file artifact
const REPORT_FILE_LINES: usize = 200;
/// Benchmark port pool offset above the balancer listener
const BENCH_PORT_OFFSET: u16 = 1000;
/// Cycles between periodic status reports
const STATUS_REPORT_STRIDE: u64 = 10;
/// Seconds to back off after a failed cycle
const ERROR_BACKOFF_SECS: u64 = 60;

/// Predicate selecting results for a named sub-balancer
#[derive(Debug, Clone)]
pub struct LabelRule {
    pub name: String,
    pub port: u16,
    pub patterns: Vec<String>,
}

impl LabelRule {
    pub fn matches(&self, result: &BenchResult) -> bool {
        let ps = result.ps.to_lowercase();
        self.patterns.iter().any(|p| ps.contains(p.as_str()))
    }
}

/// Drives hunt cycles and owns the long-lived loops
pub struct Orchestrator {
    settings: Arc<Settings>,
    callbacks: Callbacks,
    fetcher: SourceFetcher,
    scraper: Arc<ChannelScraper>,
    reporter: Reporter,
    benchmarker: Arc<Benchmarker>,
    cache: CacheStore,
    balancer: Arc<Balancer>,
    sub_balancers: Vec<(LabelRule, Arc<Balancer>)>,
    /// Overlapping cycle invocations queue on this lock
    cycle_lock: tokio::sync::Mutex<()>,
    cancel: watch::Sender<bool>,
    /// Kept alive so cancel sends always have a receiver
    cancel_rx: watch::Receiver<bool>,
    cycle_count: AtomicU64,
    last_cycle: AtomicI64,
    last_validated: AtomicUsize,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(settings: Arc<Settings>, callbacks: Callbacks) -> Arc<Self> {
        let fragment = settings.get_bool("fragment_enabled", false);
        let obfuscator = Arc::new(SniRotator::new(true));
        let benchmarker = Arc::new(Benchmarker::new(
            callbacks.engine.clone(),
            callbacks.http.clone(),
            fragment,
        ));

        let balancer = Arc::new(Balancer::new(
            BalancerOptions {
                listen_port: settings.get_int("balancer_port", 10808) as u16,
                desired_backends: settings.get_int("balancer_backends", 5) as usize,
                health_interval: Duration::from_secs(
                    settings.get_int("health_interval", 60) as u64
                ),
                fragment_enabled: fragment,
            },
            callbacks.engine.clone(),
            benchmarker.clone(),
            Some(obfuscator.clone()),
        ));

        let mut sub_balancers = Vec::new();
        if settings.get_bool("secondary_balancer_enabled", false) {
            let rule = LabelRule {
                name: settings.get_str("secondary_name", "gemini"),
                port: settings.get_int("secondary_port", 10809) as u16,
                patterns: settings
                    .get_list("secondary_labels")
                    .iter()
                    .map(|p| p.to_lowercase())
                    .collect(),
            };
            let sub = Arc::new(Balancer::new(
                BalancerOptions {
                    listen_port: rule.port,
                    desired_backends: settings.get_int("balancer_backends", 5) as usize,
                    health_interval: Duration::from_secs(
                        settings.get_int("health_interval", 60) as u64,
                    ),
                    fragment_enabled: fragment,
                },
                callbacks.engine.clone(),
                benchmarker.clone(),
                Some(obfuscator),
            ));
            sub_balancers.push((rule, sub));
        }

        let scraper = Arc::new(ChannelScraper::new(callbacks.messaging.clone()));
        let reporter = Reporter::new(scraper.clone());
        let cache = CacheStore::new(settings.runtime_dir());
        let fetcher = SourceFetcher::new(callbacks.http.clone());
        let (cancel, cancel_rx) = watch::channel(false);

        Arc::new(Orchestrator {
            settings,
            callbacks,
            fetcher,
            scraper,
            reporter,
            benchmarker,
            cache,
            balancer,
            sub_balancers,
            cycle_lock: tokio::sync::Mutex::new(()),
            cancel,
            cancel_rx,
            cycle_count: AtomicU64::new(0),
            last_cycle: AtomicI64::new(0),
            last_validated: AtomicUsize::new(0),
            loop_task: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.loop_task.lock().is_some()
    }

    fn cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    fn seed_path(&self, name: &str) -> PathBuf {
        PathBuf::from(self.settings.runtime_dir()).join(format!("{name}_seed.json"))
    }

    /// Start the balancers (warm-started from persisted seeds) and the
    /// autonomous cycle loop
    pub async fn start(self: Arc<Self>) {
        if self.is_running() {
            return;
        }
        let _ = std::fs::create_dir_all(self.settings.runtime_dir());
        let _ = self.cancel.send(false);

        let seed = load_seed(self.seed_path("balancer"));
        self.balancer
            .clone()
            .start(if seed.is_empty() { None } else { Some(seed) })
            .await;

        for (rule, sub) in &self.sub_balancers {
            let seed = load_seed(self.seed_path(&rule.name));
            sub.clone()
                .start(if seed.is_empty() { None } else { Some(seed) })
                .await;
        }

        let this = Arc::clone(&self);
        let cancel_rx = self.cancel.subscribe();
        *self.loop_task.lock() = Some(tokio::spawn(async move {
            this.autonomous_loop(cancel_rx).await;
        }));
        info!("Orchestrator started");
    }

    /// Stop the loop and every balancer
    pub async fn stop(&self) {
        let _ = self.cancel.send(true);
        let task = self.loop_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        self.balancer.stop().await;
        for (_, sub) in &self.sub_balancers {
            sub.stop().await;
        }
        info!("Orchestrator stopped");
    }

    // ---------- scraping ----------

    /// Gather candidates: messaging channels first, then each URL bank.
    /// Thin harvests are topped up from the subscription bank and the
    /// working cache.
    async fn scrape_configs(&self) -> Vec<String> {
        let mut configs: Vec<String> = Vec::new();
        let mut proxy_ports = vec![self.balancer.listen_port()];
        proxy_ports.extend(self.sub_balancers.iter().map(|(r, _)| r.port));

        let targets = self.settings.get_list("targets");
        if !targets.is_empty() {
            let limit = self.settings.get_int("telegram_limit", 50) as usize;
            let channel_uris = self.scraper.scrape(&targets, limit).await;
            info!("Channel sources: {} configs", channel_uris.len());
            configs.extend(channel_uris);
        }

        for bank in [&GENERAL_BANK, &ANTI_CENSORSHIP_BANK, &REGION_PRIORITY_BANK] {
            if self.cancelled() {
                return configs;
            }
            self.callbacks.events.on_progress(
                &format!("scraping_{}", bank.name),
                0,
                0,
            );
            let found = self.fetcher.fetch_bank(bank, &proxy_ports).await;
            configs.extend(found);
        }

        if configs.len() < THIN_HARVEST && !self.cancelled() {
            let extra = self.fetcher.fetch_bank(&SUBSCRIPTION_BANK, &proxy_ports).await;
            configs.extend(extra);
        }

        if configs.is_empty() {
            self.cache.record_failure();
        }
        if configs.len() < THIN_HARVEST {
            let cached = self.cache.load(THIN_HARVEST, true);
            if !cached.is_empty() {
                info!("Topping up thin harvest with {} cached configs", cached.len());
                configs.extend(cached);
            }
        }
        if self.cache.should_use_cache() {
            // Repeated dry scrapes: fall back to the raw cache as well
            configs.extend(self.cache.load(THIN_HARVEST, false));
        }

        configs
    }

    // ---------- cycle ----------

    /// Run one full hunt cycle. Overlapping invocations queue.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<()> {
        let cycle = 0u64;
        let started = std::time::Instant::now();
        let raw = self.scrape_configs().await;
        info!("Total raw configs: {}", raw.len());
        if self.cancelled() {
            return Ok(());
        }

        // Persist the raw harvest
        self.cache.save(&raw, false);

        // Validate
        let params = ValidatorParams {
            max_workers: self.settings.get_int("max_workers", 50) as usize,
            max_total: self.settings.get_int("max_total", 3000) as usize,
            base_port: self.balancer.listen_port() + BENCH_PORT_OFFSET,
            probe_url: self
                .settings
                .get_str("test_url", "https://www.cloudflare.com/cdn-cgi/trace"),
            timeout_secs: self.settings.get_int("timeout_seconds", 10) as u64,
        };
        let validated = Box::pin(validate_uris(
            &self.benchmarker,
            &raw,
            &params,
            &self.callbacks.events,
            &self.cancel.subscribe(),
        ))
        .await;
        info!("Validated configs: {}", validated.len());
        self.last_validated.store(validated.len(), Ordering::Relaxed);
        if self.cancelled() {
            return Ok(());
        }

        // Persist survivors
        if !validated.is_empty() {
            let working: Vec<String> = validated.iter().map(|r| r.uri.clone()).collect();
            self.cache.save(&working, true);
        }

        // Tier
        let gold: Vec<BenchResult> = validated
            .iter()
            .filter(|r| r.tier == Tier::Gold)
            .take(GOLD_CAP)
            .cloned()
            .collect();
        let silver: Vec<BenchResult> = validated
            .iter()
            .filter(|r| r.tier == Tier::Silver)
            .take(SILVER_CAP)
            .cloned()
            .collect();
        info!("Gold tier: {}, Silver tier: {}", gold.len(), silver.len());

        // Overwrite tier files
        let gold_uris: Vec<String> = gold.iter().map(|r| r.uri.clone()).collect();
        let silver_uris: Vec<String> = silver.iter().map(|r| r.uri.clone()).collect();
        let gold_file = self.settings.get_str("gold_file", "");
        if !gold_file.is_empty() {
            write_lines(&gold_file, &gold_uris);
        }
        let silver_file = self.settings.get_str("silver_file", "");
        if !silver_file.is_empty() {
            write_lines(&silver_file, &silver_uris);
        }

        // Feed the balancer and persist its seed
        let all_seed: Vec<SeedEntry> = gold
            .iter()
            .chain(silver.iter())
            .map(|r| SeedEntry {
                uri: r.uri.clone(),
                latency_ms: r.latency_ms,
            })
            .collect();
        if !all_seed.is_empty() {
            self.balancer.update_available(all_seed.clone()).await;
            if let Err(e) = save_seed(self.seed_path("balancer"), &all_seed) {
                warn!("Seed persist failed: {}", e);
            }
        }

        // Label-matched sub-balancers
        let mut secondary_report: Option<(String, Vec<String>)> = None;
        for (rule, sub) in &self.sub_balancers {
            let matched: Vec<SeedEntry> = gold
                .iter()
                .chain(silver.iter())
                .filter(|r| rule.matches(r))
                .map(|r| SeedEntry {
                    uri: r.uri.clone(),
                    latency_ms: r.latency_ms,
                })
                .collect();
            if matched.is_empty() {
                continue;
            }
            sub.update_available(matched.clone()).await;
            if let Err(e) = save_seed(self.seed_path(&rule.name), &matched) {
                warn!("Seed persist failed for {}: {}", rule.name, e);
            }
            if secondary_report.is_none() {
                secondary_report = Some((
                    rule.name.clone(),
                    matched.iter().map(|e| e.uri.clone()).collect(),
                ));
            }
        }

        // Report
        if gold.is_empty() && silver.is_empty() {
            let engine_path = self.settings.get_str("engine_path", "");
            let advisory = format!(
                "Cycle #{} finished\nraw={}, validated=0\n\
                 Tip: check the engine binary path setting (engine_path).\n\
                 engine_path={}",
                cycle,
                raw.len(),
                if engine_path.is_empty() {
                    "<empty>"
                } else {
                    engine_path.as_str()
                }
            );
            self.scraper.send_report(&advisory).await;
        } else {
            self.reporter.report_gold(&gold).await;
            let secondary = secondary_report
                .as_ref()
                .map(|(name, uris)| (name.as_str(), uris.as_slice()));
            self.reporter
                .report_files(("gold", &gold_uris), secondary, REPORT_FILE_LINES)
                .await;
        }

        self.last_cycle.store(now_ts(), Ordering::SeqCst);
        info!(
            "Cycle #{} completed in {:.1}s",
            cycle,
            started.elapsed().as_secs_f64()
        );
        self.callbacks
            .events
            .on_progress("cycle_done", cycle as usize, 0);
        self.callbacks.events.on_status(&self.status().to_string());
        Ok(())
    }

    // ---------- autonomous loop ----------

    /// Run cycles at the configured cadence until cancelled.
    ///
    /// Sleeps in one-second slices so a stop request is honored promptly;
    /// backs off after a failed cycle; emits a status report every tenth
    /// cycle.
    #[instrument(skip_all)]
    async fn autonomous_loop(self: Arc<Self>, cancel: watch::Receiver<bool>) {
        if let Err(e) = Box::pin(self.run_cycle()).await {
            error!("Initial cycle failed: {}", e);
        }

        loop {
            let sleep_seconds = self.settings.get_int("sleep_seconds", 300).max(1) as u64;
            if self.sleep_cancellable(sleep_seconds, &cancel).await {
                return;
            }

            if now_ts() - self.last_cycle.load(Ordering::SeqCst) >= sleep_seconds as i64 {
                if let Err(e) = Box::pin(self.run_cycle()).await {
                    error!("Cycle failed: {}", e);
                    if self.sleep_cancellable(ERROR_BACKOFF_SECS, &cancel).await {
                        return;
                    }
                }
            }

            let count = self.cycle_count.load(Ordering::SeqCst);
            if count > 0 && count % STATUS_REPORT_STRIDE == 0 {
                self.reporter.report_status(&self.balancer.status()).await;
            }
        }
    }

    /// Sleep in 1 s slices; true means cancellation was observed
    async fn sleep_cancellable(&self, seconds: u64, cancel: &watch::Receiver<bool>) -> bool {
        for _ in 0..seconds {
            if *cancel.borrow() {
                return true;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        *cancel.borrow()
    }

    // ---------- introspection ----------

    pub fn status(&self) -> Value {
        let mut status = json!({
            "running": self.is_running(),
            "cycle_count": self.cycle_count.load(Ordering::SeqCst),
            "last_cycle": self.last_cycle.load(Ordering::SeqCst),
            "validated_configs": self.last_validated.load(Ordering::Relaxed),
            "balancer": self.balancer.status(),
        });
        if !self.sub_balancers.is_empty() {
            status["secondary"] = Value::Array(
                self.sub_balancers
                    .iter()
                    .map(|(rule, sub)| {
                        let mut s = sub.status();
                        s["name"] = json!(rule.name);
                        s
                    })
                    .collect(),
            );
        }
        status
    }

    /// Cached configs for the host UI: the persisted seed, falling back to
    /// the gold file
    pub fn cached_configs(&self) -> Value {
        let seed = load_seed(self.seed_path("balancer"));
        if !seed.is_empty() {
            return Value::Array(
                seed.iter()
                    .map(|entry| {
                        let ps = crate::parser::parse(&entry.uri)
                            .map(|p| p.ps)
                            .unwrap_or_else(|| entry.uri.clone());
                        json!({
                            "ps": ps,
                            "latency_ms": entry.latency_ms as i64,
                            "uri": entry.uri,
                        })
                    })
                    .collect(),
            );
        }

        let gold_file = self.settings.get_str("gold_file", "");
        let lines = if gold_file.is_empty() {
            Vec::new()
        } else {
            crate::cache::read_lines(&gold_file)
        };
        Value::Array(
            lines
                .iter()
                .map(|uri| {
                    let ps = crate::parser::parse(uri)
                        .map(|p| p.ps)
                        .unwrap_or_else(|| uri.clone());
                    json!({"ps": ps, "latency_ms": 0, "uri": uri})
                })
                .collect(),
        )
    }

    pub fn balancer(&self) -> &Arc<Balancer> {
        &self.balancer
    }
}
