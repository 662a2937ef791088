//! Prospector - proxy configuration discovery and balancing
//!
//! Continuously discovers, validates, ranks, and serves proxy-server
//! configurations gathered from public sources, feeding a self-healing
//! load-balancing SOCKS endpoint with live, low-latency backends.
//!
//! ## Features
//!
//! - URI parsing for VMess, VLESS, Trojan, and Shadowsocks share links
//! - Parallel source scraping over HTTP banks and messaging channels
//! - Anti-DPI prioritization before benchmarking
//! - Bounded-concurrency benchmarking through throwaway proxy instances
//! - A health-checked balancer whose backend pool refreshes continuously
//! - Append-only caches and seed files that survive restarts
//!
//! The wire protocols themselves, the HTTP client, and the messaging
//! gateway live on the host side behind the [`callbacks`] traits.

pub mod api;
pub mod balancer;
pub mod bench;
pub mod cache;
pub mod callbacks;
pub mod error;
pub mod extract;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod prioritize;
pub mod report;
pub mod settings;
pub mod sources;

pub use api::Prospector;
pub use callbacks::{Callbacks, EventSink, HttpFetch, Messaging, ProxyEngine};
pub use error::{ProspectorError, Result};
pub use models::{Backend, BenchResult, ParsedConfig, Tier};
pub use settings::{ConfigValue, Settings};
