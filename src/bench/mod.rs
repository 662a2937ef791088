//! Benchmarking through throwaway proxy instances
//!
//! Each candidate config gets its own single-backend engine instance on a
//! leased local port; one probe request through it decides whether the
//! config survives and how fast it is.

mod ports;
mod validator;

pub use ports::{PortLease, PortPool};
pub use validator::{validate_uris, ValidatorParams};

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::debug;

use crate::callbacks::{HttpFetch, ProxyEngine};
use crate::models::{BenchResult, ParsedConfig};

/// Engine warm-up before the probe request
const WARMUP: Duration = Duration::from_millis(2000);
/// Timeout for resolving a backend host to an address
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);
/// Timeout for the country-code lookup
const GEO_TIMEOUT_SECS: u64 = 3;

/// Benchmarks parsed configs through the external engine
pub struct Benchmarker {
    engine: Arc<dyn ProxyEngine>,
    http: Arc<dyn HttpFetch>,
    fragment_enabled: bool,
    country_cache: DashMap<String, Option<String>>,
}

impl Benchmarker {
    pub fn new(engine: Arc<dyn ProxyEngine>, http: Arc<dyn HttpFetch>, fragment_enabled: bool) -> Self {
        Benchmarker {
            engine,
            http,
            fragment_enabled,
            country_cache: DashMap::new(),
        }
    }

    /// Minimal engine config: one local SOCKS inbound, one outbound
    fn single_config(&self, parsed: &ParsedConfig, local_port: u16) -> Value {
        let mut outbounds = Vec::new();
        let mut proxy_outbound = parsed.outbound.clone();
        proxy_outbound["tag"] = json!("proxy");

        if self.fragment_enabled {
            outbounds.push(fragment_outbound());
            let stream = proxy_outbound
                .as_object_mut()
                .map(|o| o.entry("streamSettings").or_insert_with(|| json!({})));
            if let Some(stream) = stream {
                stream["sockopt"] = json!({"dialerProxy": "fragment"});
            }
        }
        outbounds.push(proxy_outbound);

        json!({
            "log": {"loglevel": "warning"},
            "inbounds": [{
                "port": local_port,
                "listen": "127.0.0.1",
                "protocol": "socks",
                "settings": {"auth": "noauth", "udp": false},
            }],
            "outbounds": outbounds,
        })
    }

    /// Probe one config through a throwaway engine instance.
    ///
    /// Returns the measured latency in milliseconds, or `None` when the
    /// engine refuses the config or the probe fails. The started instance
    /// is always stopped, on every path.
    pub async fn benchmark(
        &self,
        parsed: &ParsedConfig,
        local_port: u16,
        probe_url: &str,
        timeout_secs: u64,
    ) -> Option<f64> {
        let config = self.single_config(parsed, local_port);
        let handle = self
            .engine
            .start_proxy(&config.to_string(), local_port)
            .await;
        if handle < 0 {
            debug!("Engine rejected config on port {}", local_port);
            return None;
        }

        tokio::time::sleep(WARMUP).await;
        let (status, latency_ms) = self
            .engine
            .test_url(probe_url, local_port, timeout_secs)
            .await;
        self.engine.stop_proxy(handle).await;

        if status > 0 && (status < 400 || status == 204) {
            Some(latency_ms)
        } else {
            None
        }
    }

    /// Attach tier, region, and best-effort geo data to a passing config
    pub async fn create_result(&self, parsed: ParsedConfig, latency_ms: f64) -> BenchResult {
        let ip = self.resolve_ip(&parsed.host, parsed.port).await;
        let country_code = match &ip {
            Some(ip) => self.country_for(ip).await,
            None => None,
        };
        BenchResult::new(parsed, latency_ms, ip, country_code)
    }

    async fn resolve_ip(&self, host: &str, port: u16) -> Option<String> {
        if let Ok(addr) = host.parse::<IpAddr>() {
            return Some(addr.to_string());
        }
        let lookup = tokio::net::lookup_host((host, port));
        match tokio::time::timeout(RESOLVE_TIMEOUT, lookup).await {
            Ok(Ok(mut addrs)) => addrs.next().map(|a| a.ip().to_string()),
            _ => None,
        }
    }

    async fn country_for(&self, ip: &str) -> Option<String> {
        if let Some(cached) = self.country_cache.get(ip) {
            return cached.clone();
        }
        let url = format!("https://ipapi.co/{ip}/country_code/");
        let body = self
            .http
            .fetch(&url, crate::sources::random_user_agent(), GEO_TIMEOUT_SECS, "")
            .await;
        let code = body.trim().to_string();
        let result = if code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase()) {
            Some(code)
        } else {
            None
        };
        self.country_cache.insert(ip.to_string(), result.clone());
        result
    }
}

/// TLS-hello fragmentation outbound prepended in fragment mode
pub(crate) fn fragment_outbound() -> Value {
    json!({
        "tag": "fragment",
        "protocol": "freedom",
        "settings": {
            "domainStrategy": "AsIs",
            "fragment": {"packets": "tlshello", "length": "10-20", "interval": "10-20"},
        },
    })
}
