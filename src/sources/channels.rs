//! Messaging channel scraping
//!
//! Channels are read through the host messaging gateway. Extraction keeps
//! first-seen order within a channel and gives up after three channels in
//! a row come back empty.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::callbacks::Messaging;
use crate::extract::extract_uris;

/// Consecutive empty channels tolerated before the scrape stops early
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Scrapes proxy URIs out of recent channel messages
pub struct ChannelScraper {
    messaging: Arc<dyn Messaging>,
}

impl ChannelScraper {
    pub fn new(messaging: Arc<dyn Messaging>) -> Self {
        ChannelScraper { messaging }
    }

    /// Scrape up to `limit` URIs from each channel.
    ///
    /// Within a channel, URIs keep the order they were first seen in.
    /// An empty fetch counts as a channel-level error; three in a row
    /// abort the remaining channels.
    pub async fn scrape(&self, channels: &[String], limit: usize) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut consecutive_errors = 0u32;

        for channel in channels {
            if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                warn!(
                    "Stopping channel scrape after {} consecutive errors",
                    consecutive_errors
                );
                break;
            }

            // Over-fetch messages: most carry no URIs at all
            let fetch_limit = (limit * 4).clamp(1, 200);
            let messages = self.messaging.fetch_messages(channel, fetch_limit).await;
            if messages.is_empty() {
                consecutive_errors += 1;
                continue;
            }
            consecutive_errors = 0;

            let mut channel_count = 0usize;
            'messages: for message in &messages {
                let mut found: Vec<String> = extract_uris(message).into_iter().collect();
                found.sort();
                for uri in found {
                    if channel_count >= limit {
                        break 'messages;
                    }
                    if seen.insert(uri.clone()) {
                        all.push(uri);
                        channel_count += 1;
                    }
                }
            }

            info!("Scraped {} URIs from channel {}", channel_count, channel);
        }

        all
    }

    /// Forward a text report through the gateway
    pub async fn send_report(&self, text: &str) -> bool {
        self.messaging.send_message(text).await
    }

    /// Forward a file attachment through the gateway
    pub async fn send_file(&self, name: &str, content: &str, caption: &str) -> bool {
        self.messaging.send_file(name, content, caption).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::test_support::MockMessaging;

    fn scraper_with(channels: &[(&str, &[&str])]) -> (ChannelScraper, Arc<MockMessaging>) {
        let messaging = Arc::new(MockMessaging::default());
        {
            let mut map = messaging.channels.lock();
            for (name, msgs) in channels {
                map.insert(
                    name.to_string(),
                    msgs.iter().map(|m| m.to_string()).collect(),
                );
            }
        }
        (ChannelScraper::new(messaging.clone()), messaging)
    }

    #[tokio::test]
    async fn test_scrape_extracts_and_caps() {
        let msgs: Vec<String> = (0..5)
            .map(|i| format!("new node: vless://uuid@host{i}.example:443?security=tls#n{i}"))
            .collect();
        let msg_refs: Vec<&str> = msgs.iter().map(String::as_str).collect();
        let (scraper, _) = scraper_with(&[("chan", &msg_refs)]);

        let uris = scraper.scrape(&["chan".to_string()], 3).await;
        assert_eq!(uris.len(), 3);
    }

    #[tokio::test]
    async fn test_scrape_keeps_first_seen_order() {
        let (scraper, _) = scraper_with(&[(
            "chan",
            &[
                "first vless://uuid@a.example:443?security=tls#a",
                "second trojan://pw@b.example:443#b",
            ],
        )]);

        let uris = scraper.scrape(&["chan".to_string()], 10).await;
        assert_eq!(uris.len(), 2);
        assert!(uris[0].starts_with("vless://"));
        assert!(uris[1].starts_with("trojan://"));
    }

    #[tokio::test]
    async fn test_scrape_dedups_across_channels() {
        let (scraper, _) = scraper_with(&[
            ("c1", &["vless://uuid@a.example:443?security=tls#a"]),
            ("c2", &["vless://uuid@a.example:443?security=tls#a"]),
        ]);

        let uris = scraper
            .scrape(&["c1".to_string(), "c2".to_string()], 10)
            .await;
        assert_eq!(uris.len(), 1);
    }

    #[tokio::test]
    async fn test_scrape_stops_after_three_consecutive_errors() {
        let (scraper, messaging) = scraper_with(&[(
            "alive",
            &["vless://uuid@a.example:443?security=tls#a"],
        )]);
        // Three dead channels before the live one
        let channels: Vec<String> = ["dead1", "dead2", "dead3", "alive"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let uris = scraper.scrape(&channels, 10).await;
        assert!(uris.is_empty());
        drop(messaging);
    }

    #[tokio::test]
    async fn test_error_streak_resets_on_success() {
        let (scraper, _) = scraper_with(&[
            ("alive1", &["vless://uuid@a.example:443?security=tls#a"]),
            ("alive2", &["trojan://pw@b.example:443#b"]),
        ]);
        let channels: Vec<String> = ["dead1", "dead2", "alive1", "dead3", "dead4", "alive2"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let uris = scraper.scrape(&channels, 10).await;
        assert_eq!(uris.len(), 2);
    }

    #[tokio::test]
    async fn test_report_passthrough() {
        let (scraper, messaging) = scraper_with(&[]);
        assert!(scraper.send_report("hello").await);
        assert!(scraper.send_file("f.txt", "body", "cap").await);
        assert_eq!(messaging.sent_messages.lock().len(), 1);
        assert_eq!(messaging.sent_files.lock().len(), 1);
    }
}
