use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current epoch time in whole seconds
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Performance tier derived from measured latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Gold,
    Silver,
    Dead,
}

impl Tier {
    /// Classify a latency measurement into a tier
    pub fn for_latency(latency_ms: f64) -> Self {
        if latency_ms < 200.0 {
            Tier::Gold
        } else if latency_ms < 800.0 {
            Tier::Silver
        } else if latency_ms >= 2000.0 {
            Tier::Dead
        } else {
            Tier::Silver
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Gold => "gold",
            Tier::Silver => "silver",
            Tier::Dead => "dead",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gold" => Some(Tier::Gold),
            "silver" => Some(Tier::Silver),
            "dead" => Some(Tier::Dead),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse geographic region derived from a two-letter country code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "USA")]
    Usa,
    Canada,
    Europe,
    Asia,
    Africa,
    Other,
}

const EUROPEAN_CODES: &[&str] = &[
    "AL", "AD", "AT", "BY", "BE", "BA", "BG", "HR", "CY", "CZ", "DK", "EE", "FO", "FI", "FR",
    "DE", "GI", "GR", "HU", "IS", "IE", "IT", "XK", "LV", "LI", "LT", "LU", "MK", "MT", "MD",
    "MC", "ME", "NL", "NO", "PL", "PT", "RO", "RU", "SM", "RS", "SK", "SI", "ES", "SE", "CH",
    "UA", "GB", "VA",
];

const ASIAN_CODES: &[&str] = &[
    "AF", "AM", "AZ", "BH", "BD", "BT", "BN", "KH", "CN", "GE", "HK", "IN", "ID", "IR", "IQ",
    "IL", "JP", "JO", "KZ", "KW", "KG", "LA", "LB", "MO", "MY", "MV", "MN", "MM", "NP", "KP",
    "OM", "PK", "PS", "PH", "QA", "SA", "SG", "KR", "LK", "SY", "TW", "TJ", "TH", "TL", "TR",
    "TM", "AE", "UZ", "VN", "YE",
];

const AFRICAN_CODES: &[&str] = &[
    "DZ", "AO", "BJ", "BW", "BF", "BI", "CV", "CM", "CF", "TD", "KM", "CD", "CG", "DJ", "EG",
    "GQ", "ER", "SZ", "ET", "GA", "GM", "GH", "GN", "GW", "CI", "KE", "LS", "LR", "LY", "MG",
    "MW", "ML", "MR", "MU", "YT", "MA", "MZ", "NA", "NE", "NG", "RE", "RW", "SH", "ST", "SN",
    "SC", "SL", "SO", "ZA", "SS", "SD", "TZ", "TG", "TN", "UG", "EH", "ZM", "ZW",
];

impl Region {
    /// Map an ISO country code to its region bucket
    pub fn for_country(country_code: Option<&str>) -> Self {
        let Some(cc) = country_code else {
            return Region::Other;
        };
        match cc {
            "US" => Region::Usa,
            "CA" => Region::Canada,
            _ if EUROPEAN_CODES.contains(&cc) => Region::Europe,
            _ if ASIAN_CODES.contains(&cc) => Region::Asia,
            _ if AFRICAN_CODES.contains(&cc) => Region::Africa,
            _ => Region::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Usa => "USA",
            Region::Canada => "Canada",
            Region::Europe => "Europe",
            Region::Asia => "Asia",
            Region::Africa => "Africa",
            Region::Other => "Other",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A proxy URI parsed into a normalized outbound descriptor
///
/// Invariants enforced by the parsers: non-empty host, host != 0.0.0.0,
/// non-zero port, non-empty identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedConfig {
    /// Original URI text (byte identity is what gets persisted/reported)
    pub uri: String,
    /// Engine outbound object for this destination
    pub outbound: Value,
    pub host: String,
    pub port: u16,
    /// Protocol credential: UUID, password, or method:password
    pub identity: String,
    /// Sanitized human label
    pub ps: String,
}

/// Outcome of benchmarking one parsed config; immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchResult {
    pub uri: String,
    pub outbound: Value,
    pub host: String,
    pub port: u16,
    pub identity: String,
    pub ps: String,
    pub latency_ms: f64,
    pub ip: Option<String>,
    pub country_code: Option<String>,
    pub region: Region,
    pub tier: Tier,
}

impl BenchResult {
    /// Build a result from a parsed config and its measured latency
    pub fn new(
        parsed: ParsedConfig,
        latency_ms: f64,
        ip: Option<String>,
        country_code: Option<String>,
    ) -> Self {
        let region = Region::for_country(country_code.as_deref());
        BenchResult {
            uri: parsed.uri,
            outbound: parsed.outbound,
            host: parsed.host,
            port: parsed.port,
            identity: parsed.identity,
            ps: parsed.ps,
            latency_ms,
            ip,
            country_code,
            region,
            tier: Tier::for_latency(latency_ms),
        }
    }
}

/// A single live destination inside the balancer pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backend {
    pub uri: String,
    pub latency: f64,
    pub healthy: bool,
    pub added_at: i64,
}

/// Counters maintained across balancer rebuilds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalancerStats {
    pub restarts: u64,
    pub health_checks: u64,
    pub backend_swaps: u64,
    pub last_restart: Option<i64>,
}

/// Lifecycle phase of the balancer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalancerPhase {
    Idle,
    Starting,
    Running,
    Degraded,
    Rebuilding,
    Stopping,
}

impl BalancerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalancerPhase::Idle => "idle",
            BalancerPhase::Starting => "starting",
            BalancerPhase::Running => "running",
            BalancerPhase::Degraded => "degraded",
            BalancerPhase::Rebuilding => "rebuilding",
            BalancerPhase::Stopping => "stopping",
        }
    }
}

/// A persisted (uri, latency) pair used to warm-start the balancer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntry {
    pub uri: String,
    pub latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_for_latency() {
        assert_eq!(Tier::for_latency(50.0), Tier::Gold);
        assert_eq!(Tier::for_latency(199.9), Tier::Gold);
        assert_eq!(Tier::for_latency(500.0), Tier::Silver);
        assert_eq!(Tier::for_latency(1500.0), Tier::Silver);
        assert_eq!(Tier::for_latency(2500.0), Tier::Dead);
    }

    #[test]
    fn test_tier_boundaries() {
        // Exact boundaries from the classification table
        assert_eq!(Tier::for_latency(200.0), Tier::Silver);
        assert_eq!(Tier::for_latency(800.0), Tier::Silver);
        assert_eq!(Tier::for_latency(2000.0), Tier::Dead);
    }

    #[test]
    fn test_tier_round_trip() {
        for tier in [Tier::Gold, Tier::Silver, Tier::Dead] {
            assert_eq!(Tier::from_str(tier.as_str()), Some(tier));
        }
        assert_eq!(Tier::from_str("bronze"), None);
        assert_eq!(Tier::from_str("GOLD"), Some(Tier::Gold));
    }

    #[test]
    fn test_region_for_country() {
        assert_eq!(Region::for_country(Some("US")), Region::Usa);
        assert_eq!(Region::for_country(Some("CA")), Region::Canada);
        assert_eq!(Region::for_country(Some("DE")), Region::Europe);
        assert_eq!(Region::for_country(Some("JP")), Region::Asia);
        assert_eq!(Region::for_country(Some("EG")), Region::Africa);
        assert_eq!(Region::for_country(Some("BR")), Region::Other);
        assert_eq!(Region::for_country(None), Region::Other);
    }

    #[test]
    fn test_bench_result_tier_matches_latency() {
        let parsed = ParsedConfig {
            uri: "vless://u@h:443".to_string(),
            outbound: serde_json::json!({"protocol": "vless"}),
            host: "h".to_string(),
            port: 443,
            identity: "u".to_string(),
            ps: "node".to_string(),
        };
        let result = BenchResult::new(parsed, 123.4, None, Some("US".to_string()));
        assert_eq!(result.tier, Tier::for_latency(result.latency_ms));
        assert_eq!(result.tier, Tier::Gold);
        assert_eq!(result.region, Region::Usa);
    }

    #[test]
    fn test_region_serialization() {
        let json = serde_json::to_string(&Region::Usa).unwrap();
        assert_eq!(json, "\"USA\"");
        let json = serde_json::to_string(&Region::Europe).unwrap();
        assert_eq!(json, "\"Europe\"");
    }
}
