//! Trojan URI parsing
//!
//! URL form with the password in the userinfo slot; Trojan is always TLS.

use serde_json::json;
use url::Url;

use crate::models::ParsedConfig;

use super::{bare_host, fragment_label, host_is_valid, percent_decode, query_param};

pub(super) fn parse(uri: &str) -> Option<ParsedConfig> {
    let url = Url::parse(uri).ok()?;
    let password = percent_decode(url.username());
    let host = bare_host(&url)?;
    let port = url.port().unwrap_or(443);
    let ps = fragment_label(&url);

    if !host_is_valid(&host) || password.is_empty() {
        return None;
    }

    let transport = query_param(&url, "type", "tcp");
    let allow_insecure = query_param(&url, "allowInsecure", "0") == "1";

    let outbound = json!({
        "protocol": "trojan",
        "settings": {
            "servers": [{
                "address": host,
                "port": port,
                "password": password,
            }],
        },
        "streamSettings": {
            "network": transport,
            "security": "tls",
            "tlsSettings": {
                "serverName": query_param(&url, "sni", &host),
                "allowInsecure": allow_insecure,
            },
        },
    });

    Some(ParsedConfig {
        uri: uri.to_string(),
        outbound,
        host,
        port,
        identity: password,
        ps,
    })
}
