//! Chromium engine via the DevTools protocol (chromiumoxide).

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    SetBlockedUrLsParams, SetUserAgentOverrideParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{Navigation, RenderContext, Renderer};

/// Rotated per-context to reduce trivial blocking by upstream hosts.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0 Safari/537.36",
];

/// Requests blocked in every context: heavy static assets plus ad/tracking
/// noise that slows interstitial pages down without contributing links.
const BLOCKED_URL_PATTERNS: &[&str] = &[
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.svg",
    "*.css",
    "*.woff",
    "*.woff2",
    "*/ads/*",
    "*/analytics/*",
    "*/tracking/*",
    "*googleads*",
    "*doubleclick*",
];

/// Locate the Chromium binary: `CHROME_BIN` override first, then PATH.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["chromium", "chromium-browser", "google-chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    None
}

/// Process-wide headless Chromium instance. Launch once and share; every
/// extraction gets its own page via `new_context`.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    active: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium and start its event handler task.
    pub async fn launch() -> Result<Self> {
        let chrome_bin = find_chromium().context("Chromium not found; set CHROME_BIN")?;

        let config = BrowserConfig::builder()
            .chrome_executable(&chrome_bin)
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        info!(chrome_bin = %chrome_bin.display(), "Chromium renderer launched");

        Ok(Self {
            browser: Mutex::new(browser),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    async fn prepare(&self, page: &Page) -> Result<()> {
        let ua = USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())];
        page.set_user_agent(SetUserAgentOverrideParams::new(ua))
            .await
            .context("failed to set user agent")?;

        page.execute(SetBlockedUrLsParams {
            urls: BLOCKED_URL_PATTERNS.iter().map(|s| s.to_string()).collect(),
        })
        .await
        .context("failed to install URL blocklist")?;

        Ok(())
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .context("failed to open page")?
        };

        if let Err(e) = self.prepare(&page).await {
            let _ = page.close().await;
            return Err(e);
        }

        self.active.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active: Arc::clone(&self.active),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Chromium did not close cleanly");
        }
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// One Chromium page, exclusively owned by a single extraction.
pub struct ChromiumContext {
    page: Page,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<Navigation> {
        let start = Instant::now();

        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        match result {
            Ok(Ok(_)) => {
                // Settle in-flight navigation; redirect chains resolve here.
                let _ = self.page.wait_for_navigation().await;

                let final_url = self
                    .page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| url.to_string());

                Ok(Navigation {
                    final_url,
                    load_time_ms: start.elapsed().as_millis() as u64,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("script evaluation failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert script result: {e:?}"))
    }

    async fn html(&self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to read document")?;

        let html: String = result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert document result: {e:?}"))?;

        Ok(html)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.page.close().await.context("failed to close page")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires a Chromium binary
    async fn navigate_collect_and_close() {
        let renderer = ChromiumRenderer::launch().await.expect("launch failed");
        let mut ctx = renderer.new_context().await.expect("context failed");

        ctx.navigate("data:text/html,<a href='http://h/x'>pixel</a>", 10_000)
            .await
            .expect("navigation failed");

        let html = ctx.html().await.expect("html failed");
        assert!(html.contains("pixel"));

        let clicked = ctx
            .execute_js("document.querySelector('a') !== null")
            .await
            .expect("script failed");
        assert_eq!(clicked, serde_json::Value::Bool(true));

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);

        renderer.shutdown().await.expect("shutdown failed");
    }
}
