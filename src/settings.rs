//! Runtime configuration
//!
//! A single mutex-guarded map of well-known keys to typed values with typed
//! accessors. Defaults cover every key the pipeline reads; a plain
//! `KEY=VALUE` secrets file and explicit `set` calls layer on top.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::warn;

/// A typed configuration value
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

impl ConfigValue {
    fn to_json(&self) -> Value {
        match self {
            ConfigValue::Int(v) => json!(v),
            ConfigValue::Float(v) => json!(v),
            ConfigValue::Bool(v) => json!(v),
            ConfigValue::Str(v) => json!(v),
            ConfigValue::List(v) => json!(v),
        }
    }

    fn render(&self) -> String {
        match self {
            ConfigValue::Int(v) => v.to_string(),
            ConfigValue::Float(v) => v.to_string(),
            ConfigValue::Bool(v) => v.to_string(),
            ConfigValue::Str(v) => v.clone(),
            ConfigValue::List(v) => v.join(","),
        }
    }
}

/// Default channels scraped when the host does not configure its own
const DEFAULT_TARGETS: &[&str] = &[
    "v2rayngvpn",
    "mitivpn",
    "proxymtprotoir",
    "Porteqal3",
    "v2ray_configs_pool",
    "vmessorg",
    "V2rayNGn",
    "v2ray_swhil",
    "VmessProtocol",
    "PrivateVPNs",
    "DirectVPN",
    "v2rayNG_Matsuri",
    "FalconPolV2rayNG",
    "ShadowSocks_s",
    "napsternetv_config",
    "VlessConfig",
    "iP_CF",
    "ConfigsHUB",
];

/// Central configuration for the core
pub struct Settings {
    values: RwLock<HashMap<String, ConfigValue>>,
    files_dir: RwLock<String>,
}

impl Settings {
    pub fn new() -> Self {
        let settings = Settings {
            values: RwLock::new(HashMap::new()),
            files_dir: RwLock::new(String::new()),
        };
        settings.load_defaults();
        settings
    }

    fn load_defaults(&self) {
        let mut map = self.values.write();

        let set_i = |map: &mut HashMap<String, ConfigValue>, k: &str, v: i64| {
            map.insert(k.to_string(), ConfigValue::Int(v));
        };
        let set_s = |map: &mut HashMap<String, ConfigValue>, k: &str, v: &str| {
            map.insert(k.to_string(), ConfigValue::Str(v.to_string()));
        };
        let set_b = |map: &mut HashMap<String, ConfigValue>, k: &str, v: bool| {
            map.insert(k.to_string(), ConfigValue::Bool(v));
        };

        // Messaging credentials (host-side gateway; presence validated here)
        set_i(&mut map, "api_id", 0);
        set_s(&mut map, "api_hash", "");
        set_s(&mut map, "phone", "");
        set_s(&mut map, "bot_token", "");
        set_s(&mut map, "report_channel", "");
        set_i(&mut map, "telegram_limit", 50);
        map.insert(
            "targets".to_string(),
            ConfigValue::List(DEFAULT_TARGETS.iter().map(|s| s.to_string()).collect()),
        );

        // Paths (rebased under <files_dir>/runtime by set_files_dir)
        set_s(&mut map, "engine_path", "");
        set_s(&mut map, "state_file", "runtime/state.json");
        set_s(&mut map, "raw_file", "runtime/raw_configs.txt");
        set_s(&mut map, "gold_file", "runtime/gold_configs.txt");
        set_s(&mut map, "silver_file", "runtime/silver_configs.txt");

        // Probing
        set_s(&mut map, "test_url", "https://www.cloudflare.com/cdn-cgi/trace");
        set_s(&mut map, "fallback_test_url", "https://www.google.com/generate_204");
        set_i(&mut map, "scan_limit", 50);
        set_i(&mut map, "max_total", 3000);
        set_i(&mut map, "max_workers", 50);
        set_i(&mut map, "timeout_seconds", 10);

        // Timing
        set_i(&mut map, "sleep_seconds", 300);

        // Balancer
        set_i(&mut map, "balancer_port", 10808);
        set_i(&mut map, "balancer_backends", 5);
        set_i(&mut map, "health_interval", 60);
        set_b(&mut map, "fragment_enabled", false);

        // Label-matched secondary balancer
        set_b(&mut map, "secondary_balancer_enabled", false);
        set_s(&mut map, "secondary_name", "gemini");
        set_i(&mut map, "secondary_port", 10809);
        map.insert(
            "secondary_labels".to_string(),
            ConfigValue::List(vec!["gemini".to_string(), "gmn".to_string()]),
        );
    }

    // ---------- typed accessors ----------

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.values.read().get(key) {
            Some(ConfigValue::Int(v)) => *v,
            _ => default,
        }
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.values.read().get(key) {
            Some(ConfigValue::Float(v)) => *v,
            Some(ConfigValue::Int(v)) => *v as f64,
            _ => default,
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.read().get(key) {
            Some(ConfigValue::Bool(v)) => *v,
            _ => default,
        }
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        match self.values.read().get(key) {
            Some(ConfigValue::Str(v)) => v.clone(),
            _ => default.to_string(),
        }
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.values.read().get(key) {
            Some(ConfigValue::List(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    pub fn set(&self, key: &str, value: ConfigValue) {
        self.values.write().insert(key.to_string(), value);
    }

    /// Set from a string, coercing to the existing type of the key.
    ///
    /// Returns false when the value cannot be coerced.
    pub fn set_from_str(&self, key: &str, value: &str) -> bool {
        let mut map = self.values.write();
        let coerced = match map.get(key) {
            Some(ConfigValue::Int(_)) => value.trim().parse().map(ConfigValue::Int).ok(),
            Some(ConfigValue::Float(_)) => value.trim().parse().map(ConfigValue::Float).ok(),
            Some(ConfigValue::Bool(_)) => match value.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(ConfigValue::Bool(true)),
                "false" | "0" | "no" => Some(ConfigValue::Bool(false)),
                _ => None,
            },
            Some(ConfigValue::List(_)) => Some(ConfigValue::List(
                value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            )),
            _ => Some(ConfigValue::Str(value.to_string())),
        };
        match coerced {
            Some(v) => {
                map.insert(key.to_string(), v);
                true
            }
            None => false,
        }
    }

    /// Render a value as a display string
    pub fn get_rendered(&self, key: &str) -> Option<String> {
        self.values.read().get(key).map(ConfigValue::render)
    }

    /// Full snapshot as JSON (for the host surface)
    pub fn to_json(&self) -> Value {
        let map = self.values.read();
        let mut out = serde_json::Map::new();
        for (k, v) in map.iter() {
            out.insert(k.clone(), v.to_json());
        }
        Value::Object(out)
    }

    // ---------- files dir ----------

    /// Rebase all runtime file paths under `<dir>/runtime`
    pub fn set_files_dir(&self, dir: &str) {
        *self.files_dir.write() = dir.to_string();
        let runtime = format!("{}/runtime", dir.trim_end_matches('/'));
        for (key, name) in [
            ("state_file", "state.json"),
            ("raw_file", "raw_configs.txt"),
            ("gold_file", "gold_configs.txt"),
            ("silver_file", "silver_configs.txt"),
        ] {
            self.set(key, ConfigValue::Str(format!("{runtime}/{name}")));
        }
    }

    pub fn files_dir(&self) -> String {
        self.files_dir.read().clone()
    }

    /// Directory holding runtime artifacts (seeds, tier files)
    pub fn runtime_dir(&self) -> String {
        let dir = self.files_dir();
        if dir.is_empty() {
            "runtime".to_string()
        } else {
            format!("{}/runtime", dir.trim_end_matches('/'))
        }
    }

    // ---------- env file ----------

    /// Load a plain `KEY=VALUE` secrets file into the map.
    ///
    /// Lines starting with `#` and blank lines are skipped; surrounding
    /// single or double quotes on values are stripped. Returns the number
    /// of recognized keys applied.
    pub fn load_env_file<P: AsRef<Path>>(&self, path: P) -> usize {
        let Ok(content) = std::fs::read_to_string(path.as_ref()) else {
            return 0;
        };

        let mut applied = 0;
        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            if self.apply_env_entry(key, value) {
                applied += 1;
            } else {
                warn!("Unrecognized secrets key: {}", key);
            }
        }
        applied
    }

    fn apply_env_entry(&self, key: &str, value: &str) -> bool {
        let target = match key {
            "API_ID" | "PROSPECTOR_API_ID" => "api_id",
            "API_HASH" | "PROSPECTOR_API_HASH" => "api_hash",
            "PHONE" | "PROSPECTOR_PHONE" => "phone",
            "TOKEN" | "BOT_TOKEN" => "bot_token",
            "CHAT_ID" | "REPORT_CHANNEL" => "report_channel",
            "PROSPECTOR_TARGETS" => "targets",
            "PROSPECTOR_ENGINE_PATH" => "engine_path",
            "PROSPECTOR_TEST_URL" => "test_url",
            "PROSPECTOR_SCAN_LIMIT" => "scan_limit",
            "PROSPECTOR_MAX_CONFIGS" => "max_total",
            "PROSPECTOR_WORKERS" => "max_workers",
            "PROSPECTOR_TEST_TIMEOUT" => "timeout_seconds",
            "PROSPECTOR_TELEGRAM_LIMIT" => "telegram_limit",
            "PROSPECTOR_SLEEP" => "sleep_seconds",
            "PROSPECTOR_BALANCER_PORT" => "balancer_port",
            "PROSPECTOR_BALANCER_BACKENDS" => "balancer_backends",
            "PROSPECTOR_HEALTH_INTERVAL" => "health_interval",
            "PROSPECTOR_FRAGMENT" => "fragment_enabled",
            "PROSPECTOR_SECONDARY_BALANCER" => "secondary_balancer_enabled",
            "PROSPECTOR_SECONDARY_PORT" => "secondary_port",
            _ => return false,
        };
        self.set_from_str(target, value)
    }

    // ---------- validation ----------

    /// Check credentials and numeric ranges, returning human-readable
    /// errors in field order
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.get_int("api_id", 0) == 0 {
            errors.push("api_id is required".to_string());
        }
        if self.get_str("api_hash", "").is_empty() {
            errors.push("api_hash is required".to_string());
        }
        if self.get_str("phone", "").is_empty() {
            errors.push("phone is required".to_string());
        }

        const RANGES: &[(&str, i64, i64)] = &[
            ("scan_limit", 1, 1000),
            ("max_total", 1, 10000),
            ("max_workers", 1, 200),
            ("timeout_seconds", 1, 60),
            ("telegram_limit", 1, 500),
            ("sleep_seconds", 10, 3600),
        ];
        for (field, min, max) in RANGES {
            let value = self.get_int(field, 0);
            if value < *min || value > *max {
                errors.push(format!("{field} must be between {min} and {max}"));
            }
        }

        errors
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
