//! Summary reports over the messaging gateway

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::models::BenchResult;
use crate::sources::ChannelScraper;

/// Entries shown in the gold summary message
const GOLD_REPORT_LIMIT: usize = 10;

/// Emits cycle summaries and file artifacts
pub struct Reporter {
    scraper: Arc<ChannelScraper>,
}

impl Reporter {
    pub fn new(scraper: Arc<ChannelScraper>) -> Self {
        Reporter { scraper }
    }

    /// Send the numbered gold list, capped at ten entries plus a total
    pub async fn report_gold(&self, configs: &[BenchResult]) -> bool {
        if configs.is_empty() {
            return false;
        }

        let mut report = String::from("\u{1f3c6} **Gold Configs Report**\n\n");
        for (i, result) in configs.iter().take(GOLD_REPORT_LIMIT).enumerate() {
            report.push_str(&format!(
                "{}. {} - {}ms\n",
                i + 1,
                result.ps,
                result.latency_ms as i64
            ));
        }
        report.push_str(&format!(
            "\nTotal: {} gold configs available",
            configs.len()
        ));

        self.scraper.send_report(&report).await
    }

    /// Send URI buckets as file attachments.
    ///
    /// Each bucket becomes `<name>_configs.txt` with caption
    /// `"<name> (top min(n,max)/n)"`.
    pub async fn report_files(
        &self,
        primary: (&str, &[String]),
        secondary: Option<(&str, &[String])>,
        max_lines: usize,
    ) -> bool {
        let mut any = false;
        for (name, uris) in std::iter::once(primary).chain(secondary) {
            if uris.is_empty() {
                continue;
            }
            let shown = uris.len().min(max_lines);
            let content: String = uris
                .iter()
                .take(max_lines)
                .map(|u| format!("{u}\n"))
                .collect();
            let caption = format!("{} (top {}/{})", name, shown, uris.len());
            let filename = format!("{name}_configs.txt");
            if self.scraper.send_file(&filename, &content, &caption).await {
                info!("Sent {} ({} lines)", filename, shown);
                any = true;
            }
        }
        any
    }

    /// Summarize a balancer status snapshot as a message
    pub async fn report_status(&self, status: &Value) -> bool {
        let running = status["running"].as_bool().unwrap_or(false);
        let backends = status["backends"].as_u64().unwrap_or(0);
        let restarts = status["stats"]["restarts"].as_u64().unwrap_or(0);

        let report = format!(
            "\u{1f4ca} **Status Report**\n\n\
             Balancer: {}\n\
             Backends: {}\n\
             Restarts: {}\n",
            if running { "Running" } else { "Stopped" },
            backends,
            restarts,
        );
        self.scraper.send_report(&report).await
    }
}
