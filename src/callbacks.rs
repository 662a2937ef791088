//! External collaborator interfaces
//!
//! The core never links against a concrete proxy engine, HTTP client, or
//! messaging transport. The host supplies implementations of these traits
//! at init time and the pipeline drives everything through them.

use std::sync::Arc;

use async_trait::async_trait;

/// Handle returned by the engine for a started proxy instance.
///
/// Negative values signal a failed start; every non-negative handle must be
/// passed back to `stop_proxy` exactly once.
pub type EngineHandle = i64;

/// The embedded proxy engine that actually speaks the wire protocols
#[async_trait]
pub trait ProxyEngine: Send + Sync {
    /// Start an engine instance for the given config JSON, listening on
    /// `listen_port`. Returns a handle, negative on failure.
    async fn start_proxy(&self, config_json: &str, listen_port: u16) -> EngineHandle;

    /// Stop a previously started instance
    async fn stop_proxy(&self, handle: EngineHandle);

    /// Issue one probe request through the local SOCKS inbound.
    ///
    /// Returns (status_code, latency_ms); status 0 means the request failed
    /// outright.
    async fn test_url(&self, url: &str, listen_port: u16, timeout_secs: u64) -> (u16, f64);
}

/// Outbound HTTP used to pull source texts
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Fetch a URL body as text, empty string on any failure.
    ///
    /// `proxy` is empty for a direct request, else `socks5://host:port`.
    async fn fetch(&self, url: &str, user_agent: &str, timeout_secs: u64, proxy: &str) -> String;
}

/// Messaging gateway used for channel scraping and reporting
#[async_trait]
pub trait Messaging: Send + Sync {
    /// Pull up to `limit` recent message texts from a channel
    async fn fetch_messages(&self, channel: &str, limit: usize) -> Vec<String>;

    /// Send a plain text message; false on failure
    async fn send_message(&self, text: &str) -> bool;

    /// Send a named file with a caption; false on failure
    async fn send_file(&self, name: &str, content: &str, caption: &str) -> bool;
}

/// Progress and status notifications back to the host
///
/// Both methods default to no-ops so hosts only implement what they render.
pub trait EventSink: Send + Sync {
    fn on_progress(&self, _phase: &str, _current: usize, _total: usize) {}
    fn on_status(&self, _status_json: &str) {}
}

/// No-op sink used when the host does not care about events
pub struct NullEventSink;

impl EventSink for NullEventSink {}

/// Bundle of host-provided collaborators handed to `init`
#[derive(Clone)]
pub struct Callbacks {
    pub engine: Arc<dyn ProxyEngine>,
    pub http: Arc<dyn HttpFetch>,
    pub messaging: Arc<dyn Messaging>,
    pub events: Arc<dyn EventSink>,
}

impl Callbacks {
    pub fn new(
        engine: Arc<dyn ProxyEngine>,
        http: Arc<dyn HttpFetch>,
        messaging: Arc<dyn Messaging>,
    ) -> Self {
        Callbacks {
            engine,
            http,
            messaging,
            events: Arc::new(NullEventSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared mock collaborators for unit tests across the crate

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Engine mock that records start/stop pairing and serves scripted
    /// probe outcomes keyed by outbound address.
    pub struct MockEngine {
        next_handle: AtomicI64,
        /// (status_code, latency_ms) served for every probe unless overridden
        pub default_probe: (u16, f64),
        /// Per-address probe overrides; key is the outbound "address" field
        pub probes: Mutex<HashMap<String, (u16, f64)>>,
        /// Handles currently started and not yet stopped
        pub live: Mutex<Vec<EngineHandle>>,
        /// Every (listen_port, config_json) passed to start_proxy
        pub configs: Mutex<Vec<(u16, String)>>,
        /// Latest outbound address started per listen port
        port_addr: Mutex<HashMap<u16, String>>,
        pub started: AtomicI64,
        pub stopped: AtomicI64,
        /// When true, every start fails with a negative handle
        pub fail_start: Mutex<bool>,
        /// Port of the most recent start, for assertions
        pub last_port: AtomicI64,
    }

    impl MockEngine {
        pub fn new(default_probe: (u16, f64)) -> Self {
            MockEngine {
                next_handle: AtomicI64::new(1),
                default_probe,
                probes: Mutex::new(HashMap::new()),
                live: Mutex::new(Vec::new()),
                configs: Mutex::new(Vec::new()),
                port_addr: Mutex::new(HashMap::new()),
                started: AtomicI64::new(0),
                stopped: AtomicI64::new(0),
                fail_start: Mutex::new(false),
                last_port: AtomicI64::new(0),
            }
        }

        pub fn live_handles(&self) -> usize {
            self.live.lock().len()
        }

        pub fn set_probe(&self, address: &str, outcome: (u16, f64)) {
            self.probes.lock().insert(address.to_string(), outcome);
        }

        /// Most recent config started on a port, parsed as JSON
        pub fn last_config_on(&self, port: u16) -> Option<serde_json::Value> {
            self.configs
                .lock()
                .iter()
                .rev()
                .find(|(p, _)| *p == port)
                .and_then(|(_, c)| serde_json::from_str(c).ok())
        }

        fn first_address(value: &serde_json::Value) -> Option<String> {
            match value {
                serde_json::Value::Object(map) => {
                    if let Some(serde_json::Value::String(addr)) = map.get("address") {
                        return Some(addr.clone());
                    }
                    map.values().find_map(Self::first_address)
                }
                serde_json::Value::Array(items) => items.iter().find_map(Self::first_address),
                _ => None,
            }
        }
    }

    #[async_trait]
    impl ProxyEngine for MockEngine {
        async fn start_proxy(&self, config_json: &str, listen_port: u16) -> EngineHandle {
            self.last_port.store(listen_port as i64, Ordering::SeqCst);
            self.configs
                .lock()
                .push((listen_port, config_json.to_string()));
            if *self.fail_start.lock() {
                return -1;
            }
            if let Ok(config) = serde_json::from_str::<serde_json::Value>(config_json) {
                if let Some(addr) = Self::first_address(&config) {
                    self.port_addr.lock().insert(listen_port, addr);
                }
            }
            let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
            self.live.lock().push(handle);
            self.started.fetch_add(1, Ordering::SeqCst);
            handle
        }

        async fn stop_proxy(&self, handle: EngineHandle) {
            self.live.lock().retain(|h| *h != handle);
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }

        async fn test_url(&self, _url: &str, listen_port: u16, _timeout_secs: u64) -> (u16, f64) {
            let addr = self.port_addr.lock().get(&listen_port).cloned();
            if let Some(addr) = addr {
                if let Some(outcome) = self.probes.lock().get(&addr) {
                    return *outcome;
                }
            }
            self.default_probe
        }
    }

    /// HTTP mock serving canned bodies keyed by URL
    #[derive(Default)]
    pub struct MockHttp {
        pub bodies: Mutex<HashMap<String, String>>,
        pub requests: Mutex<Vec<(String, String)>>,
    }

    impl MockHttp {
        pub fn with_body(url: &str, body: &str) -> Self {
            let mock = MockHttp::default();
            mock.bodies.lock().insert(url.to_string(), body.to_string());
            mock
        }
    }

    #[async_trait]
    impl HttpFetch for MockHttp {
        async fn fetch(
            &self,
            url: &str,
            _user_agent: &str,
            _timeout_secs: u64,
            proxy: &str,
        ) -> String {
            self.requests
                .lock()
                .push((url.to_string(), proxy.to_string()));
            self.bodies.lock().get(url).cloned().unwrap_or_default()
        }
    }

    /// Messaging mock recording everything sent
    #[derive(Default)]
    pub struct MockMessaging {
        pub channels: Mutex<HashMap<String, Vec<String>>>,
        pub sent_messages: Mutex<Vec<String>>,
        pub sent_files: Mutex<Vec<(String, String, String)>>,
        /// Channels that fail on fetch
        pub failing: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Messaging for MockMessaging {
        async fn fetch_messages(&self, channel: &str, limit: usize) -> Vec<String> {
            if self.failing.lock().iter().any(|c| c == channel) {
                return Vec::new();
            }
            self.channels
                .lock()
                .get(channel)
                .map(|msgs| msgs.iter().take(limit).cloned().collect())
                .unwrap_or_default()
        }

        async fn send_message(&self, text: &str) -> bool {
            self.sent_messages.lock().push(text.to_string());
            true
        }

        async fn send_file(&self, name: &str, content: &str, caption: &str) -> bool {
            self.sent_files
                .lock()
                .push((name.to_string(), content.to_string(), caption.to_string()));
            true
        }
    }

}
