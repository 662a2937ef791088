//! VMess URI parsing
//!
//! The payload after `vmess://` is base64 JSON with the well-known
//! `add/port/id/aid/ps/scy/net/tls/sni/path/host` keys.

use serde_json::{json, Value};

use crate::extract::{clean_ps, safe_b64decode_str};
use crate::models::ParsedConfig;

use super::host_is_valid;

fn str_field(j: &Value, key: &str, default: &str) -> String {
    j.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// Numeric fields arrive as either JSON numbers or digit strings
fn int_field(j: &Value, key: &str) -> i64 {
    match j.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

pub(super) fn parse(uri: &str) -> Option<ParsedConfig> {
    let payload = uri.strip_prefix("vmess://")?;
    let decoded = safe_b64decode_str(payload)?;
    let j: Value = serde_json::from_str(&decoded).ok()?;

    let host = str_field(&j, "add", "");
    let port = int_field(&j, "port");
    let uuid = str_field(&j, "id", "");
    let ps = clean_ps(&str_field(&j, "ps", "Unknown"));

    if !host_is_valid(&host) || port <= 0 || port > u16::MAX as i64 || uuid.is_empty() {
        return None;
    }
    let port = port as u16;

    let network = str_field(&j, "net", "tcp");
    let security = str_field(&j, "tls", "none");

    let mut outbound = json!({
        "protocol": "vmess",
        "settings": {
            "vnext": [{
                "address": host,
                "port": port,
                "users": [{
                    "id": uuid,
                    "alterId": int_field(&j, "aid"),
                    "security": str_field(&j, "scy", "auto"),
                }],
            }],
        },
        "streamSettings": {
            "network": network,
            "security": security,
        },
    });

    if network == "ws" {
        outbound["streamSettings"]["wsSettings"] = json!({
            "path": str_field(&j, "path", "/"),
            "headers": {"Host": str_field(&j, "host", "")},
        });
    }

    if security == "tls" {
        outbound["streamSettings"]["tlsSettings"] = json!({
            "serverName": str_field(&j, "sni", &host),
            "allowInsecure": false,
        });
    }

    Some(ParsedConfig {
        uri: uri.to_string(),
        outbound,
        host,
        port,
        identity: uuid,
        ps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    fn encode(payload: serde_json::Value) -> String {
        format!("vmess://{}", BASE64.encode(payload.to_string()))
    }

    #[test]
    fn test_string_port_accepted() {
        let uri = encode(serde_json::json!({
            "add": "a.example", "port": "8443", "id": "uuid-1", "aid": "2"
        }));
        let parsed = parse(&uri).unwrap();
        assert_eq!(parsed.port, 8443);
        assert_eq!(
            parsed.outbound["settings"]["vnext"][0]["users"][0]["alterId"],
            2
        );
    }

    #[test]
    fn test_tcp_without_tls_has_no_extra_settings() {
        let uri = encode(serde_json::json!({
            "add": "a.example", "port": 80, "id": "uuid-1"
        }));
        let parsed = parse(&uri).unwrap();
        let stream = &parsed.outbound["streamSettings"];
        assert_eq!(stream["network"], "tcp");
        assert_eq!(stream["security"], "none");
        assert!(stream.get("wsSettings").is_none());
        assert!(stream.get("tlsSettings").is_none());
    }

    #[test]
    fn test_sni_defaults_to_host() {
        let uri = encode(serde_json::json!({
            "add": "a.example", "port": 443, "id": "uuid-1", "tls": "tls"
        }));
        let parsed = parse(&uri).unwrap();
        assert_eq!(
            parsed.outbound["streamSettings"]["tlsSettings"]["serverName"],
            "a.example"
        );
    }

    #[test]
    fn test_rejections() {
        // missing id
        assert!(parse(&encode(serde_json::json!({"add": "a", "port": 443}))).is_none());
        // zero port
        assert!(parse(&encode(serde_json::json!({"add": "a", "port": 0, "id": "x"}))).is_none());
        // not base64 json
        assert!(parse("vmess://%%%").is_none());
        assert!(parse("vmess://bm90IGpzb24=").is_none());
    }
}
