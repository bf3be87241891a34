//! Passive HTTP extraction: fetch the master reference page, scan its markup
//! for candidate links, and probe each candidate before trusting it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, RANGE, USER_AGENT};
use tracing::{debug, warn};

use playlink_common::{ResolverConfig, ServerSet};

use crate::scan;
use crate::traits::LinkExtractor;

/// Rotated per request to reduce trivial blocking.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0 Safari/537.36",
];

const PROBE_HEAD_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_RANGE_TIMEOUT: Duration = Duration::from_secs(12);
const PROBE_GET_TIMEOUT: Duration = Duration::from_secs(15);

/// Extracts candidates from a page's markup without executing any scripts.
/// Cheap and fast; the rendered path only runs when this under-delivers.
pub struct HttpExtractor {
    client: reqwest::Client,
    config: Arc<ResolverConfig>,
}

impl HttpExtractor {
    pub fn new(config: Arc<ResolverConfig>) -> Self {
        // The destination ecosystem runs broken/self-signed certificates;
        // verification would reject hosts that serve fine.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.fetch_timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self { client, config }
    }

    fn user_agent() -> &'static str {
        USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())]
    }

    async fn fetch_page(&self, url: &str) -> Option<String> {
        let resp = match self
            .client
            .get(url)
            .header(USER_AGENT, Self::user_agent())
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url, error = %e, "Page fetch failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            debug!(url, status = %resp.status(), "Page fetch returned non-success");
            return None;
        }

        match resp.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                debug!(url, error = %e, "Page body read failed");
                None
            }
        }
    }

    /// Probe a candidate URL. Accepted at the first probe whose status lands
    /// in that probe's accepted set.
    async fn probe(&self, url: &str) -> bool {
        let ua = Self::user_agent();

        // Lightweight existence check
        if let Ok(resp) = self
            .client
            .head(url)
            .header(USER_AGENT, ua)
            .timeout(PROBE_HEAD_TIMEOUT)
            .send()
            .await
        {
            if matches!(resp.status().as_u16(), 200 | 302 | 303 | 307) {
                return true;
            }
        }

        // Partial fetch of the first KB
        if let Ok(resp) = self
            .client
            .get(url)
            .header(USER_AGENT, ua)
            .header(RANGE, "bytes=0-1023")
            .timeout(PROBE_RANGE_TIMEOUT)
            .send()
            .await
        {
            if matches!(resp.status().as_u16(), 200 | 206 | 302 | 303) {
                return true;
            }
        }

        // Plain fetch, body dropped unread. 403 counts: some hosts reject
        // metadata probes but still serve a real client.
        if let Ok(resp) = self
            .client
            .get(url)
            .header(USER_AGENT, ua)
            .timeout(PROBE_GET_TIMEOUT)
            .send()
            .await
        {
            if matches!(resp.status().as_u16(), 200 | 302 | 403) {
                return true;
            }
        }

        false
    }

    async fn validate(&self, candidates: ServerSet) -> ServerSet {
        let mut valid = ServerSet::new();
        for link in candidates.into_links() {
            if self.probe(&link.url).await {
                valid.insert(link.name, link.url);
            } else {
                debug!(name = %link.name, url = %link.url, "Dropping unreachable candidate");
            }
        }
        valid
    }
}

#[async_trait]
impl LinkExtractor for HttpExtractor {
    async fn extract(&self, master_ref: &str) -> ServerSet {
        let body = match self.fetch_page(master_ref).await {
            Some(body) => body,
            None => return ServerSet::new(),
        };

        let mut candidates =
            scan::anchor_candidates(&body, master_ref, &self.config.preferred_servers);

        // Fallback: no labeled anchors, sweep the raw text for known hosts.
        // Collisions overwrite — last match wins.
        if candidates.is_empty() {
            for url in scan::host_matches(&body) {
                candidates.insert("auto", url);
            }
        }

        if candidates.is_empty() {
            debug!(url = master_ref, "No candidates in page");
            return candidates;
        }

        let validated = self.validate(candidates).await;
        if validated.is_empty() {
            warn!(url = master_ref, "All candidates failed validation");
        }
        validated
    }

    fn name(&self) -> &str {
        "http"
    }
}
