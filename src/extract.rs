//! URI extraction from raw source text
//!
//! Source bodies arrive as plain text, HTML fragments, or base64 blobs;
//! extraction normalizes them all into a set of candidate proxy URIs.

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

static URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:vmess|vless|trojan|ss|shadowsocks)://[^\s"'<>\[\]]+"#)
        .expect("uri regex")
});

static B64_BLOB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9+/=]{100,}").expect("base64 blob regex"));

/// Trailing punctuation commonly glued onto URIs in prose and markup
const TRAILING_PUNCT: &[char] = &[')', ']', '}', ',', '.', ';', ':', '!', '?'];

/// Decode base64 accepting the URL-safe alphabet, missing padding, and
/// stray non-alphabet characters (subscription payloads are messy)
pub fn safe_b64decode(data: &str) -> Option<Vec<u8>> {
    let mut padded: String = data
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/'))
        .collect();
    if padded.is_empty() {
        return None;
    }
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    BASE64.decode(padded.as_bytes()).ok()
}

/// Decode base64 into text, lossily replacing invalid UTF-8
pub fn safe_b64decode_str(data: &str) -> Option<String> {
    safe_b64decode(data).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Sanitize a human label down to printable ASCII, defaulting to "Unknown"
pub fn clean_ps(ps: &str) -> String {
    let cleaned: String = ps
        .chars()
        .filter(|c| (' '..='\u{7e}').contains(c))
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Extract proxy URIs from free-form text.
///
/// When the text itself yields nothing, up to 20 base64-looking blobs of
/// 100+ characters are decoded and scanned the same way.
pub fn extract_uris(text: &str) -> HashSet<String> {
    extract_with_depth(text, 0)
}

fn extract_with_depth(text: &str, depth: u8) -> HashSet<String> {
    let mut uris = HashSet::new();
    if text.is_empty() {
        return uris;
    }

    for m in URI_RE.find_iter(text) {
        let uri = m.as_str().trim_end_matches(TRAILING_PUNCT);
        if uri.len() > 10 {
            uris.insert(uri.to_string());
        }
    }

    // Nothing in the clear: look for encoded subscription payloads
    if uris.is_empty() && depth < 2 {
        for blob in B64_BLOB_RE.find_iter(text).take(20) {
            if let Some(decoded) = safe_b64decode_str(blob.as_str()) {
                if decoded.contains("://") {
                    uris.extend(extract_with_depth(&decoded, depth + 1));
                }
            }
        }
    }

    uris
}
