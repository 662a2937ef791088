//! Anti-DPI prioritization
//!
//! Candidate URIs are bucketed into eight tiers by how well their transport
//! survives deep packet inspection, shuffled within each tier, and emitted
//! tier by tier so the benchmark pool reaches the most promising configs
//! first.

use rand::seq::SliceRandom;

use crate::extract::safe_b64decode_str;

/// Textual markers of destinations that are unreachable or locally blocked
pub const BLOCKLIST_PATTERNS: &[&str] = &[
    "ir.",
    ".ir",
    "iran",
    "0.0.0.0",
    "127.0.0.1",
    "localhost",
    "10.10.34.",
    "192.168.",
];

/// CDN domains whose TLS identity configs can borrow (domain fronting)
pub const CDN_WHITELIST_DOMAINS: &[&str] = &[
    "cloudflare.com",
    "cdn.cloudflare.com",
    "cloudflare-dns.com",
    "fastly.net",
    "fastly.com",
    "global.fastly.net",
    "akamai.net",
    "akamaiedge.net",
    "akamaihd.net",
    "azureedge.net",
    "azure.com",
    "microsoft.com",
    "amazonaws.com",
    "cloudfront.net",
    "awsglobalaccelerator.com",
    "googleusercontent.com",
    "googleapis.com",
    "gstatic.com",
    "edgecastcdn.net",
    "stackpathdns.com",
    "cdn77.org",
    "cdnjs.cloudflare.com",
    "jsdelivr.net",
    "unpkg.com",
    "workers.dev",
    "pages.dev",
    "vercel.app",
    "netlify.app",
    "arvancloud.ir",
    "arvancloud.com",
    "r2.dev",
    "arvan.run",
    "arvanstorage.ir",
    "arvancdn.ir",
    "arvancdn.com",
    "cdn.arvancloud.ir",
];

/// Whether the URI textually matches the CDN whitelist
pub fn is_cdn_based(uri: &str) -> bool {
    let lower = uri.to_lowercase();
    CDN_WHITELIST_DOMAINS
        .iter()
        .any(|domain| lower.contains(domain))
}

/// Whether the URI matches a blocklist pattern and should be discarded
pub fn is_blocked(uri: &str) -> bool {
    let lower = uri.to_lowercase();
    BLOCKLIST_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Bracketed hosts are IPv6; widely suppressed, so deprioritized
fn is_ipv6(uri: &str) -> bool {
    uri.contains('[') && uri.contains(']')
}

fn classify(uri: &str) -> usize {
    let lower = uri.to_lowercase();
    let cdn = is_cdn_based(uri);

    if is_ipv6(uri) {
        return 7;
    }

    if lower.starts_with("vless://") {
        let reality = lower.contains("reality") || lower.contains("pbk=");
        let grpc = lower.contains("grpc") || lower.contains("gun");
        let h2 = lower.contains("h2") || lower.contains("http/2");
        let ws = lower.contains("ws") || lower.contains("websocket");
        let tls443 = uri.contains(":443") && lower.contains("tls");

        if reality && cdn {
            1
        } else if reality {
            2
        } else if grpc || h2 {
            3
        } else if ws && tls443 {
            4
        } else if tls443 {
            6
        } else {
            8
        }
    } else if lower.starts_with("trojan://") {
        let grpc = lower.contains("grpc") || lower.contains("gun");
        let ws = lower.contains("ws") || lower.contains("websocket");
        let port443 = uri.contains(":443");

        if grpc {
            3
        } else if ws && port443 {
            4
        } else if port443 {
            6
        } else {
            8
        }
    } else if lower.starts_with("vmess://") {
        classify_vmess(uri, cdn)
    } else {
        8
    }
}

fn classify_vmess(uri: &str, cdn: bool) -> usize {
    let Some(decoded) = safe_b64decode_str(&uri["vmess://".len()..]) else {
        return 8;
    };
    let dl = decoded.to_lowercase();

    let ws = dl.contains("\"net\":\"ws\"");
    let tls = dl.contains("\"tls\":\"tls\"");
    let grpc = dl.contains("\"net\":\"grpc\"") || dl.contains("\"net\":\"gun\"");
    let port443 = dl.contains("\"port\":\"443\"") || dl.contains("\"port\":443");

    if grpc && tls {
        3
    } else if ws && tls && cdn {
        5
    } else if ws && tls && port443 {
        4
    } else if tls && port443 {
        6
    } else {
        8
    }
}

/// Reorder URIs into tier emission order, dropping blocked entries.
///
/// The output is a permutation of the non-blocked input; entries within a
/// tier are shuffled so repeated cycles spread load across sources.
pub fn prioritize(uris: &[String]) -> Vec<String> {
    let mut tiers: [Vec<String>; 8] = Default::default();

    for uri in uris {
        if is_blocked(uri) {
            continue;
        }
        tiers[classify(uri) - 1].push(uri.clone());
    }

    let mut rng = rand::thread_rng();
    let mut out = Vec::with_capacity(uris.len());
    for tier in tiers.iter_mut() {
        tier.shuffle(&mut rng);
        out.append(tier);
    }
    out
}
