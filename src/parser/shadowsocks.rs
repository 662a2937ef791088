//! Shadowsocks URI parsing
//!
//! Three wire forms are accepted: `method:password@host:port` in the clear,
//! `base64(method:password)@host:port`, and a fully base64 body.

use serde_json::json;

use crate::extract::{clean_ps, safe_b64decode_str};
use crate::models::ParsedConfig;

use super::{host_is_valid, percent_decode};

pub(super) fn parse(uri: &str) -> Option<ParsedConfig> {
    let (body, ps) = match uri.split_once('#') {
        Some((body, tag)) => (body, clean_ps(&percent_decode(tag))),
        None => (uri, "Unknown".to_string()),
    };

    let mut core = body
        .strip_prefix("ss://")
        .or_else(|| body.strip_prefix("shadowsocks://"))?
        .to_string();

    // Query parameters carry plugin options we do not model; drop them
    // before attempting a whole-body decode.
    if let Some((head, _)) = core.split_once('?') {
        core = head.to_string();
    }

    if !core.contains('@') {
        core = safe_b64decode_str(&core)?;
    }

    let (userinfo, hostport) = core.split_once('@')?;
    if !hostport.contains(':') {
        return None;
    }

    // Standard form base64-encodes the userinfo; legacy URIs leave it plain
    let (method, password) = match safe_b64decode_str(userinfo)
        .and_then(|decoded| decoded.split_once(':').map(|(m, p)| (m.to_string(), p.to_string())))
        .filter(|(m, p)| !m.is_empty() && !p.is_empty())
    {
        Some(pair) => pair,
        None => {
            let (m, p) = userinfo.split_once(':')?;
            (m.to_string(), p.to_string())
        }
    };

    let (host, port_str) = hostport.rsplit_once(':')?;
    let digits: String = port_str.chars().take_while(|c| c.is_ascii_digit()).collect();
    let port: u16 = digits.parse().ok()?;

    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    if !host_is_valid(&host) || port == 0 {
        return None;
    }

    let outbound = json!({
        "protocol": "shadowsocks",
        "settings": {
            "servers": [{
                "address": host,
                "port": port,
                "method": method,
                "password": password,
            }],
        },
    });

    let identity = format!("{method}:{password}");
    Some(ParsedConfig {
        uri: uri.to_string(),
        outbound,
        host,
        port,
        identity,
        ps,
    })
}
