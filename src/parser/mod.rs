//! Proxy URI parsers
//!
//! Each supported scheme parses into the same normalized [`ParsedConfig`];
//! anything malformed or violating the config invariants yields `None`.

mod shadowsocks;
mod trojan;
mod vless;
mod vmess;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::models::ParsedConfig;

/// Parse any supported proxy URI, dispatching on the lowercased scheme
pub fn parse(uri: &str) -> Option<ParsedConfig> {
    let scheme_end = uri.find("://")?;
    let scheme = uri[..scheme_end].to_lowercase();

    match scheme.as_str() {
        "vmess" => vmess::parse(uri),
        "vless" => vless::parse(uri),
        "trojan" => trojan::parse(uri),
        "ss" | "shadowsocks" => shadowsocks::parse(uri),
        _ => None,
    }
}

/// Percent-decode, falling back to the raw text on invalid sequences
pub(crate) fn percent_decode(s: &str) -> String {
    match percent_decode_str(s).decode_utf8() {
        Ok(cow) => cow.into_owned(),
        Err(_) => s.to_string(),
    }
}

/// Host string with IPv6 brackets removed
pub(crate) fn bare_host(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(host.trim_start_matches('[').trim_end_matches(']').to_string())
}

/// First query parameter value for `key`, or the default
pub(crate) fn query_param(url: &Url, key: &str, default: &str) -> String {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| default.to_string())
}

/// Decoded fragment used as the human label
pub(crate) fn fragment_label(url: &Url) -> String {
    let raw = url.fragment().unwrap_or("");
    if raw.is_empty() {
        "Unknown".to_string()
    } else {
        crate::extract::clean_ps(&percent_decode(raw))
    }
}

/// Reject hosts that can never be dialed
pub(crate) fn host_is_valid(host: &str) -> bool {
    !host.is_empty() && host != "0.0.0.0"
}
