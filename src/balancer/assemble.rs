//! Balanced engine config assembly
//!
//! Builds the composite config the engine serves traffic from: one SOCKS
//! inbound with sniffing, one tagged outbound per healthy backend routed
//! through a random-strategy balancer, plus direct/blackhole fallbacks
//! and DoH DNS.

use serde_json::{json, Value};

use crate::bench::fragment_outbound;
use crate::models::Backend;

use super::obfuscate::SniRotator;

/// DNS-over-HTTPS servers baked into every balanced config
const DNS_SERVERS: &[&str] = &[
    "https://cloudflare-dns.com/dns-query",
    "https://dns.google/dns-query",
    "1.1.1.1",
    "8.8.8.8",
];

/// Assemble the balanced config for the given healthy backends.
///
/// Backends that fail to re-parse are skipped. With no usable backends the
/// config falls back to a `direct` freedom outbound so the listener stays
/// up while the pool recovers.
pub fn build_balanced_config(
    listen_port: u16,
    backends: &[Backend],
    obfuscator: Option<&SniRotator>,
    fragment_enabled: bool,
) -> Value {
    let mut outbounds: Vec<Value> = Vec::new();
    let mut selectors: Vec<String> = Vec::new();

    if fragment_enabled {
        outbounds.push(fragment_outbound());
    }

    for backend in backends.iter().filter(|b| b.healthy) {
        let Some(parsed) = crate::parser::parse(&backend.uri) else {
            continue;
        };

        let tag = format!("proxy-{}", selectors.len());
        let mut outbound = match obfuscator {
            Some(rotator) => rotator.apply(&parsed.outbound),
            None => parsed.outbound,
        };
        outbound["tag"] = json!(tag);

        if fragment_enabled {
            if outbound.get("streamSettings").is_none() {
                outbound["streamSettings"] = json!({});
            }
            if outbound["streamSettings"].get("sockopt").is_none() {
                outbound["streamSettings"]["sockopt"] = json!({});
            }
            outbound["streamSettings"]["sockopt"]["dialerProxy"] = json!("fragment");
        }

        outbounds.push(outbound);
        selectors.push(tag);
    }

    if selectors.is_empty() {
        outbounds.push(json!({
            "tag": "direct",
            "protocol": "freedom",
            "settings": {"domainStrategy": "AsIs"},
        }));
        selectors.push("direct".to_string());
    }

    outbounds.push(json!({
        "protocol": "blackhole",
        "tag": "block",
        "settings": {},
    }));

    json!({
        "log": {"loglevel": "warning"},
        "inbounds": [{
            "port": listen_port,
            "listen": "0.0.0.0",
            "protocol": "socks",
            "tag": "socks-in",
            "settings": {"auth": "noauth", "udp": true},
            "sniffing": {
                "enabled": true,
                "destOverride": ["http", "tls", "quic"],
                "routeOnly": false,
            },
        }],
        "outbounds": outbounds,
        "routing": {
            "domainStrategy": "AsIs",
            "balancers": [{
                "tag": "balancer",
                "selector": selectors,
                "strategy": {"type": "random"},
            }],
            "rules": [{
                "type": "field",
                "inboundTag": ["socks-in"],
                "balancerTag": "balancer",
            }],
        },
        "dns": {"servers": DNS_SERVERS},
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_ts;

    fn backend(uri: &str, healthy: bool) -> Backend {
        Backend {
            uri: uri.to_string(),
            latency: 100.0,
            healthy,
            added_at: now_ts(),
        }
    }

    #[test]
    fn test_config_with_backends() {
        let backends = vec![
            backend("vless://uuid-1@a.example:443?security=tls#a", true),
            backend("trojan://pw@b.example:443#b", true),
        ];
        let config = build_balanced_config(10808, &backends, None, false);

        assert_eq!(config["inbounds"][0]["port"], 10808);
        assert_eq!(config["inbounds"][0]["protocol"], "socks");
        assert_eq!(
            config["inbounds"][0]["sniffing"]["destOverride"],
            serde_json::json!(["http", "tls", "quic"])
        );

        let selector = &config["routing"]["balancers"][0]["selector"];
        assert_eq!(*selector, serde_json::json!(["proxy-0", "proxy-1"]));
        assert_eq!(
            config["routing"]["balancers"][0]["strategy"]["type"],
            "random"
        );
        assert_eq!(config["outbounds"][0]["tag"], "proxy-0");
        assert_eq!(config["outbounds"][1]["tag"], "proxy-1");
        // Blackhole terminator is always present
        let outbounds = config["outbounds"].as_array().unwrap();
        assert_eq!(outbounds.last().unwrap()["tag"], "block");
    }

    #[test]
    fn test_unhealthy_backends_excluded() {
        let backends = vec![
            backend("vless://uuid-1@a.example:443?security=tls#a", true),
            backend("trojan://pw@b.example:443#b", false),
        ];
        let config = build_balanced_config(10808, &backends, None, false);
        let selector = &config["routing"]["balancers"][0]["selector"];
        assert_eq!(*selector, serde_json::json!(["proxy-0"]));
    }

    #[test]
    fn test_empty_pool_falls_back_to_direct() {
        let config = build_balanced_config(10808, &[], None, false);
        let selector = &config["routing"]["balancers"][0]["selector"];
        assert_eq!(*selector, serde_json::json!(["direct"]));
        assert_eq!(config["outbounds"][0]["protocol"], "freedom");
    }

    #[test]
    fn test_unparseable_backend_skipped() {
        let backends = vec![
            backend("vmess://garbage!!!", true),
            backend("trojan://pw@b.example:443#b", true),
        ];
        let config = build_balanced_config(10808, &backends, None, false);
        let selector = &config["routing"]["balancers"][0]["selector"];
        // Skipped entries do not leave tag gaps
        assert_eq!(*selector, serde_json::json!(["proxy-0"]));
    }

    #[test]
    fn test_fragment_mode_wires_dialer_proxy() {
        let backends = vec![backend("vless://uuid-1@a.example:443?security=tls#a", true)];
        let config = build_balanced_config(10808, &backends, None, true);

        assert_eq!(config["outbounds"][0]["tag"], "fragment");
        assert_eq!(
            config["outbounds"][1]["streamSettings"]["sockopt"]["dialerProxy"],
            "fragment"
        );
    }

    #[test]
    fn test_obfuscator_applied_to_backends() {
        let rotator = SniRotator::new(true);
        let expected_sni = rotator.current().to_string();
        let backends = vec![backend("vless://uuid-1@a.example:443?security=tls#a", true)];
        let config = build_balanced_config(10808, &backends, Some(&rotator), false);

        assert_eq!(
            config["outbounds"][0]["streamSettings"]["tlsSettings"]["serverName"],
            expected_sni.as_str()
        );
    }

    #[test]
    fn test_dns_servers_present() {
        let config = build_balanced_config(10808, &[], None, false);
        let servers = config["dns"]["servers"].as_array().unwrap();
        assert_eq!(servers.len(), 4);
        assert!(servers[0].as_str().unwrap().starts_with("https://"));
    }
}
