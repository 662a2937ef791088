//! Persistence for harvested URIs and balancer seeds
//!
//! Two append-only line caches survive restarts: the raw subscriptions
//! cache and the working (probe-passing) cache. Balancer seeds are small
//! JSON documents rewritten wholesale via temp-replace.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{now_ts, SeedEntry};

const RAW_CACHE_FILE: &str = "subscriptions_cache.txt";
const WORKING_CACHE_FILE: &str = "working_configs_cache.txt";

/// Read non-empty trimmed lines; missing files read as empty
pub fn read_lines<P: AsRef<Path>>(path: P) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path.as_ref()) else {
        return Vec::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Overwrite a file with one line per entry, returning lines written
pub fn write_lines<P: AsRef<Path>>(path: P, lines: &[String]) -> usize {
    if let Some(parent) = path.as_ref().parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(mut file) = File::create(path.as_ref()) else {
        return 0;
    };
    let mut count = 0;
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if writeln!(file, "{line}").is_err() {
            break;
        }
        count += 1;
    }
    count
}

/// Append lines not already present in the file, returning the number added
pub fn append_unique_lines<P: AsRef<Path>>(path: P, lines: &[String]) -> usize {
    let mut existing: HashSet<String> = read_lines(path.as_ref()).into_iter().collect();
    let new_lines: Vec<&String> = lines
        .iter()
        .filter(|line| !line.is_empty() && existing.insert((*line).clone()))
        .collect();
    if new_lines.is_empty() {
        return 0;
    }

    if let Some(parent) = path.as_ref().parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path.as_ref()) else {
        return 0;
    };
    let mut added = 0;
    for line in new_lines {
        if writeln!(file, "{line}").is_err() {
            break;
        }
        added += 1;
    }
    added
}

/// Line caches with consecutive-failure tracking
pub struct CacheStore {
    base_dir: PathBuf,
    consecutive_failures: AtomicU32,
}

impl CacheStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        CacheStore {
            base_dir: base_dir.as_ref().to_path_buf(),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    fn path_for(&self, working: bool) -> PathBuf {
        self.base_dir.join(if working {
            WORKING_CACHE_FILE
        } else {
            RAW_CACHE_FILE
        })
    }

    /// Append URIs not already cached; a successful append resets the
    /// failure streak. Returns the number of lines added.
    pub fn save(&self, uris: &[String], working: bool) -> usize {
        let appended = append_unique_lines(self.path_for(working), uris);
        if appended > 0 {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            debug!(
                appended,
                working, "Cached new configs"
            );
        }
        appended
    }

    /// Load cached URIs, keeping only the last `max_count` lines per file
    /// and only lines that look like URIs.
    pub fn load(&self, max_count: usize, working_only: bool) -> HashSet<String> {
        let sources = if working_only {
            vec![self.path_for(true)]
        } else {
            vec![self.path_for(false), self.path_for(true)]
        };

        let mut configs = HashSet::new();
        for path in sources {
            let lines = read_lines(&path);
            let start = lines.len().saturating_sub(max_count);
            for line in &lines[start..] {
                if line.contains("://") {
                    configs.insert(line.clone());
                }
            }
        }
        configs
    }

    pub fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// True after two or more consecutive scrape failures
    pub fn should_use_cache(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) >= 2
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

/// On-disk form of a balancer seed file
#[derive(Debug, Serialize, Deserialize)]
struct SeedFile {
    saved_at: i64,
    configs: Vec<SeedEntry>,
}

/// Load a balancer seed; unreadable or malformed files yield an empty seed
pub fn load_seed<P: AsRef<Path>>(path: P) -> Vec<SeedEntry> {
    let Ok(content) = std::fs::read_to_string(path.as_ref()) else {
        return Vec::new();
    };
    match serde_json::from_str::<SeedFile>(&content) {
        Ok(seed) => seed.configs,
        Err(e) => {
            warn!("Ignoring malformed seed file {:?}: {}", path.as_ref(), e);
            Vec::new()
        }
    }
}

/// Persist a balancer seed, capped at 1000 entries, via temp-replace
pub fn save_seed<P: AsRef<Path>>(path: P, configs: &[SeedEntry]) -> crate::error::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let seed = SeedFile {
        saved_at: now_ts(),
        configs: configs.iter().take(1000).cloned().collect(),
    };
    let body = serde_json::to_string_pretty(&seed)?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_append_unique_lines_dedup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lines.txt");

        assert_eq!(append_unique_lines(&path, &strings(&["a", "b"])), 2);
        assert_eq!(append_unique_lines(&path, &strings(&["b", "c"])), 1);
        assert_eq!(read_lines(&path), vec!["a", "b", "c"]);

        // Repeating the same save adds nothing
        assert_eq!(append_unique_lines(&path, &strings(&["a", "b", "c"])), 0);
        assert_eq!(read_lines(&path).len(), 3);
    }

    #[test]
    fn test_append_dedups_within_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lines.txt");
        assert_eq!(append_unique_lines(&path, &strings(&["a", "b", "a"])), 2);
        assert_eq!(read_lines(&path), vec!["a", "b"]);
    }

    #[test]
    fn test_cache_save_and_load() {
        let dir = tempdir().unwrap();
        let cache = CacheStore::new(dir.path());

        let raw = strings(&["vless://u@h1:443#a", "trojan://p@h2:443#b"]);
        assert_eq!(cache.save(&raw, false), 2);

        let working = strings(&["vless://u@h1:443#a"]);
        assert_eq!(cache.save(&working, true), 1);

        let all = cache.load(usize::MAX, false);
        assert_eq!(all.len(), 2);

        let working_only = cache.load(usize::MAX, true);
        assert_eq!(working_only.len(), 1);
        assert!(working_only.contains("vless://u@h1:443#a"));
    }

    #[test]
    fn test_cache_load_respects_max_count() {
        let dir = tempdir().unwrap();
        let cache = CacheStore::new(dir.path());
        let uris: Vec<String> = (0..10).map(|i| format!("ss://m:p@host{i}:1#x")).collect();
        cache.save(&uris, false);

        let last_three = cache.load(3, false);
        assert_eq!(last_three.len(), 3);
        assert!(last_three.contains("ss://m:p@host9:1#x"));
        assert!(!last_three.contains("ss://m:p@host0:1#x"));
    }

    #[test]
    fn test_cache_skips_non_uri_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(RAW_CACHE_FILE);
        std::fs::write(&path, "garbage line\nvless://u@h:443#ok\n").unwrap();

        let cache = CacheStore::new(dir.path());
        let loaded = cache.load(usize::MAX, false);
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_failure_tracking() {
        let dir = tempdir().unwrap();
        let cache = CacheStore::new(dir.path());

        assert!(!cache.should_use_cache());
        cache.record_failure();
        assert!(!cache.should_use_cache());
        cache.record_failure();
        assert!(cache.should_use_cache());
        assert_eq!(cache.failure_count(), 2);

        // A successful save resets the streak
        cache.save(&strings(&["ss://m:p@h:1#x"]), false);
        assert!(!cache.should_use_cache());
    }

    #[test]
    fn test_seed_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seed.json");

        let configs = vec![
            SeedEntry {
                uri: "vless://u@h:443#a".to_string(),
                latency_ms: 120.5,
            },
            SeedEntry {
                uri: "trojan://p@h:443#b".to_string(),
                latency_ms: 340.0,
            },
        ];
        save_seed(&path, &configs).unwrap();

        let loaded = load_seed(&path);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].uri, "vless://u@h:443#a");
        assert!((loaded[0].latency_ms - 120.5).abs() < f64::EPSILON);

        // File carries a saved_at stamp
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["saved_at"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_seed_caps_at_1000() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seed.json");

        let configs: Vec<SeedEntry> = (0..1500)
            .map(|i| SeedEntry {
                uri: format!("vless://u@h{i}:443#n"),
                latency_ms: i as f64,
            })
            .collect();
        save_seed(&path, &configs).unwrap();
        assert_eq!(load_seed(&path).len(), 1000);
    }

    #[test]
    fn test_seed_missing_or_malformed() {
        let dir = tempdir().unwrap();
        assert!(load_seed(dir.path().join("absent.json")).is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(load_seed(&bad).is_empty());
    }

    #[test]
    fn test_write_lines_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tier.txt");
        assert_eq!(write_lines(&path, &strings(&["a", "b"])), 2);
        assert_eq!(write_lines(&path, &strings(&["c"])), 1);
        assert_eq!(read_lines(&path), vec!["c"]);
    }
}
