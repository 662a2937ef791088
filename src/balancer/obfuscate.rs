//! Rotating-SNI obfuscation
//!
//! A pure JSON transform applied while assembling the balanced config:
//! TLS server names, gRPC authorities, and WebSocket Host headers are
//! rewritten to the current whitelisted CDN domain.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{json, Value};

use crate::prioritize::CDN_WHITELIST_DOMAINS;

/// Only the best-known fronting domains participate in rotation
const ROTATION_SIZE: usize = 8;

/// Cycles through whitelisted CDN domains for SNI rewriting
pub struct SniRotator {
    domains: Vec<String>,
    index: AtomicUsize,
    pub enabled: bool,
}

impl SniRotator {
    pub fn new(enabled: bool) -> Self {
        SniRotator {
            domains: CDN_WHITELIST_DOMAINS
                .iter()
                .take(ROTATION_SIZE)
                .map(|s| s.to_string())
                .collect(),
            index: AtomicUsize::new(0),
            enabled,
        }
    }

    pub fn current(&self) -> &str {
        &self.domains[self.index.load(Ordering::Relaxed) % self.domains.len()]
    }

    /// Advance to the next domain and return it
    pub fn rotate(&self) -> &str {
        self.index.fetch_add(1, Ordering::Relaxed);
        self.current()
    }

    /// Rewrite the SNI-bearing surfaces of an outbound.
    ///
    /// Outbounds without stream settings pass through untouched.
    pub fn apply(&self, outbound: &Value) -> Value {
        if !self.enabled || outbound.get("streamSettings").is_none() {
            return outbound.clone();
        }

        let sni = self.current();
        let mut conf = outbound.clone();
        let stream = &mut conf["streamSettings"];

        if stream.get("tlsSettings").is_some() {
            stream["tlsSettings"]["serverName"] = json!(sni);
        }
        if stream.get("grpcSettings").is_some() {
            stream["grpcSettings"]["authority"] = json!(sni);
        }
        if stream.get("wsSettings").is_some() {
            if stream["wsSettings"].get("headers").is_none() {
                stream["wsSettings"]["headers"] = json!({});
            }
            stream["wsSettings"]["headers"]["Host"] = json!(sni);
        }

        conf
    }
}
