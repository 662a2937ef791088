//! Parallel source bank fetching
//!
//! A bounded worker pool pulls every URL in a bank through the host HTTP
//! collaborator, honoring a hard bank deadline: when it expires the caller
//! keeps whatever the finished workers produced.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::callbacks::HttpFetch;
use crate::extract::{extract_uris, safe_b64decode_str};

use super::banks::{random_user_agent, Bank};

/// Direct requests never wait longer than this
const DIRECT_TIMEOUT_CAP: u64 = 8;
/// Proxied retries never wait longer than this
const PROXY_TIMEOUT_CAP: u64 = 12;
/// At most this many local SOCKS ports are tried per URL
const MAX_PROXY_RETRIES: usize = 3;

/// Fetches URI candidates from static URL banks
pub struct SourceFetcher {
    http: Arc<dyn HttpFetch>,
}

impl SourceFetcher {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        SourceFetcher { http }
    }

    /// Fetch one bank with its configured pool size and deadline
    pub async fn fetch_bank(&self, bank: &Bank, proxy_ports: &[u16]) -> HashSet<String> {
        info!(
            "Fetching {} bank ({} sources, {} workers)",
            bank.name,
            bank.urls.len(),
            bank.workers
        );
        let found = self
            .fetch_urls(
                bank.urls,
                proxy_ports,
                bank.workers,
                bank.per_request_timeout,
                Duration::from_secs(bank.deadline_secs),
            )
            .await;
        info!("{} bank yielded {} URIs", bank.name, found.len());
        found
    }

    /// Run a bounded worker pool over `urls`, unioning extracted URIs.
    ///
    /// The deadline is hard: in-flight work past it is abandoned and the
    /// set collected so far is returned.
    pub async fn fetch_urls(
        &self,
        urls: &[&str],
        proxy_ports: &[u16],
        workers: usize,
        per_request_timeout: u64,
        deadline: Duration,
    ) -> HashSet<String> {
        if urls.is_empty() {
            return HashSet::new();
        }
        let workers = workers.clamp(1, urls.len());
        let results: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        let pool = futures::stream::iter(urls.iter().copied())
            .map(|url| {
                let results = results.clone();
                async move {
                    let found = self.fetch_single(url, proxy_ports, per_request_timeout).await;
                    if !found.is_empty() {
                        results.lock().extend(found);
                    }
                }
            })
            .buffer_unordered(workers)
            .collect::<()>();

        if tokio::time::timeout(deadline, pool).await.is_err() {
            debug!("Bank deadline reached, collecting partial results");
        }

        let taken = std::mem::take(&mut *results.lock());
        taken
    }

    /// Fetch one URL: direct first, then up to three local SOCKS proxies
    async fn fetch_single(
        &self,
        url: &str,
        proxy_ports: &[u16],
        timeout: u64,
    ) -> HashSet<String> {
        let direct = self
            .http
            .fetch(url, random_user_agent(), timeout.min(DIRECT_TIMEOUT_CAP), "")
            .await;
        let found = extract_from_body(&direct);
        if !found.is_empty() {
            return found;
        }

        for port in proxy_ports.iter().take(MAX_PROXY_RETRIES) {
            let proxy = format!("socks5://127.0.0.1:{port}");
            let body = self
                .http
                .fetch(url, random_user_agent(), timeout.min(PROXY_TIMEOUT_CAP), &proxy)
                .await;
            let found = extract_from_body(&body);
            if !found.is_empty() {
                debug!("Source {} reachable only via proxy port {}", url, port);
                return found;
            }
        }

        HashSet::new()
    }
}

/// Extract URIs from a response body, decoding wholly-base64 bodies first
fn extract_from_body(body: &str) -> HashSet<String> {
    if body.is_empty() {
        return HashSet::new();
    }
    if !body.contains("://") {
        if let Some(decoded) = safe_b64decode_str(body.trim()) {
            if decoded.contains("://") {
                return extract_uris(&decoded);
            }
        }
    }
    extract_uris(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::test_support::MockHttp;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    const URI_A: &str = "vless://uuid@a.example:443?security=tls#A";
    const URI_B: &str = "trojan://pw@b.example:443#B";

    #[tokio::test]
    async fn test_fetch_plain_body() {
        let http = Arc::new(MockHttp::with_body(
            "https://src/plain",
            &format!("{URI_A}\n{URI_B}\n"),
        ));
        let fetcher = SourceFetcher::new(http);

        let found = fetcher
            .fetch_urls(&["https://src/plain"], &[], 4, 8, Duration::from_secs(30))
            .await;
        assert_eq!(found.len(), 2);
        assert!(found.contains(URI_A));
    }

    #[tokio::test]
    async fn test_fetch_base64_body() {
        let body = BASE64.encode(format!("{URI_A}\n"));
        let http = Arc::new(MockHttp::with_body("https://src/b64", &body));
        let fetcher = SourceFetcher::new(http);

        let found = fetcher
            .fetch_urls(&["https://src/b64"], &[], 4, 8, Duration::from_secs(30))
            .await;
        assert_eq!(found.len(), 1);
        assert!(found.contains(URI_A));
    }

    #[tokio::test]
    async fn test_fetch_retries_through_proxies() {
        // Body only arrives when the request goes through a proxy
        let http = Arc::new(MockHttp::default());
        let fetcher = SourceFetcher::new(http.clone());

        // Direct and proxied fetches both return empty here; assert that the
        // proxy attempts were actually issued, capped at three ports.
        let _ = fetcher
            .fetch_urls(
                &["https://src/hard"],
                &[10808, 10809, 10810, 10811],
                2,
                8,
                Duration::from_secs(30),
            )
            .await;

        let requests = http.requests.lock();
        assert_eq!(requests.len(), 4); // 1 direct + 3 proxied
        assert_eq!(requests[0].1, "");
        assert_eq!(requests[1].1, "socks5://127.0.0.1:10808");
        assert_eq!(requests[3].1, "socks5://127.0.0.1:10810");
    }

    #[tokio::test]
    async fn test_results_unioned_across_urls() {
        let http = Arc::new(MockHttp::default());
        http.bodies.lock().insert("u1".into(), URI_A.into());
        http.bodies.lock().insert("u2".into(), URI_B.into());
        http.bodies.lock().insert("u3".into(), URI_A.into());
        let fetcher = SourceFetcher::new(http);

        let found = fetcher
            .fetch_urls(&["u1", "u2", "u3"], &[], 3, 8, Duration::from_secs(30))
            .await;
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_extract_from_body_prefers_clear_text() {
        let found = extract_from_body(URI_A);
        assert_eq!(found.len(), 1);
        assert!(extract_from_body("").is_empty());
        assert!(extract_from_body("nothing here").is_empty());
    }
}
