//! VLESS URI parsing
//!
//! URL form: `vless://<uuid>@host:port?security=...&type=...#label`.
//! Reality transport is signalled by `security=reality` and carries the
//! `pbk`/`sid`/`fp` parameters.

use serde_json::{json, Value};
use url::Url;

use crate::models::ParsedConfig;

use super::{bare_host, fragment_label, host_is_valid, percent_decode, query_param};

pub(super) fn parse(uri: &str) -> Option<ParsedConfig> {
    let url = Url::parse(uri).ok()?;
    let uuid = percent_decode(url.username());
    let host = bare_host(&url)?;
    let port = url.port().unwrap_or(443);
    let ps = fragment_label(&url);

    if !host_is_valid(&host) || uuid.is_empty() {
        return None;
    }

    let security = query_param(&url, "security", "none");
    let transport = query_param(&url, "type", "tcp");

    let mut outbound = json!({
        "protocol": "vless",
        "settings": {
            "vnext": [{
                "address": host,
                "port": port,
                "users": [{
                    "id": uuid,
                    "encryption": query_param(&url, "encryption", "none"),
                }],
            }],
        },
        "streamSettings": {
            "network": transport,
            "security": security,
        },
    });

    if security == "tls" || security == "reality" {
        let mut tls: Value = json!({
            "serverName": query_param(&url, "sni", &host),
            "allowInsecure": false,
        });
        if security == "reality" {
            tls["fingerprint"] = json!(query_param(&url, "fp", "chrome"));
            tls["publicKey"] = json!(query_param(&url, "pbk", ""));
            tls["shortId"] = json!(query_param(&url, "sid", ""));
            outbound["streamSettings"]["realitySettings"] = tls;
        } else {
            outbound["streamSettings"]["tlsSettings"] = tls;
        }
    }

    match transport.as_str() {
        "ws" => {
            outbound["streamSettings"]["wsSettings"] = json!({
                "path": query_param(&url, "path", "/"),
                "headers": {"Host": query_param(&url, "host", "")},
            });
        }
        "grpc" => {
            outbound["streamSettings"]["grpcSettings"] = json!({
                "serviceName": query_param(&url, "serviceName", ""),
            });
        }
        _ => {}
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

    #[test]
    fn test_reality_transport() {
        let uri = "vless://11111111-2222-3333-4444-555555555555@vps.example:8443\
                   ?security=reality&type=tcp&sni=swdist.apple.com&fp=chrome&pbk=PUBKEY&sid=ab12#Reality%20Node";
        let parsed = parse(uri).unwrap();

        assert_eq!(parsed.host, "vps.example");
        assert_eq!(parsed.port, 8443);
        assert_eq!(parsed.ps, "Reality Node");

        let reality = &parsed.outbound["streamSettings"]["realitySettings"];
        assert_eq!(reality["serverName"], "swdist.apple.com");
        assert_eq!(reality["publicKey"], "PUBKEY");
        assert_eq!(reality["shortId"], "ab12");
        assert_eq!(reality["fingerprint"], "chrome");
        assert!(parsed.outbound["streamSettings"]
            .get("tlsSettings")
            .is_none());
    }

    #[test]
    fn test_ws_tls_transport() {
        let uri =
            "vless://uuid-0@cdn.example:443?security=tls&type=ws&path=%2Ftunnel&host=front.example#W";
        let parsed = parse(uri).unwrap();
        let stream = &parsed.outbound["streamSettings"];
        assert_eq!(stream["network"], "ws");
        assert_eq!(stream["wsSettings"]["path"], "/tunnel");
        assert_eq!(stream["wsSettings"]["headers"]["Host"], "front.example");
        assert_eq!(stream["tlsSettings"]["serverName"], "cdn.example");
    }

    #[test]
    fn test_grpc_transport() {
        let uri = "vless://uuid-0@h.example:443?security=tls&type=grpc&serviceName=svc#G";
        let parsed = parse(uri).unwrap();
        assert_eq!(
            parsed.outbound["streamSettings"]["grpcSettings"]["serviceName"],
            "svc"
        );
    }

    #[test]
    fn test_default_port_and_plain_security() {
        let parsed = parse("vless://uuid-0@h.example#P").unwrap();
        assert_eq!(parsed.port, 443);
        assert_eq!(parsed.outbound["streamSettings"]["security"], "none");
    }

    #[test]
    fn test_rejects_missing_user_or_null_host() {
        assert!(parse("vless://h.example:443#x").is_none());
        assert!(parse("vless://uuid@0.0.0.0:443#x").is_none());
    }

    #[test]
    fn test_ipv6_host_unbracketed() {
        let parsed = parse("vless://uuid-0@[2001:db8::1]:443?security=tls#V6").unwrap();
        assert_eq!(parsed.host, "2001:db8::1");
    }
}
