//! Rendered extraction: drive a disposable browser context when passive
//! fetching under-delivers. Heavier and slower; capped and always torn down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use chromium_renderer::{RenderContext, Renderer};
use playlink_common::{ResolverConfig, ServerSet};

use crate::scan;
use crate::traits::LinkExtractor;

/// Call-to-action labels tried in order; the first match is clicked.
const CTA_LABELS: &[&str] = &[
    "generate",
    "get link",
    "download",
    "create link",
    "start",
    "watch",
];

/// Extensions that mark a master reference as already directly playable.
const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov", "m3u8"];

fn is_direct_media(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    MEDIA_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{ext}")))
}

fn click_script() -> String {
    let labels = serde_json::to_string(CTA_LABELS).expect("serializable labels");
    format!(
        r#"(() => {{
            const labels = {labels};
            const els = Array.from(document.querySelectorAll('button, a'));
            for (const label of labels) {{
                const el = els.find(e => (e.textContent || '').toLowerCase().includes(label));
                if (el) {{ try {{ el.click(); }} catch (_) {{}} return label; }}
            }}
            return '';
        }})()"#
    )
}

/// Extracts candidates from the fully rendered page. Each call owns one
/// fresh context; sessions never outlive the call.
pub struct RenderExtractor {
    renderer: Arc<dyn Renderer>,
    semaphore: Semaphore,
    config: Arc<ResolverConfig>,
}

impl RenderExtractor {
    pub fn new(renderer: Arc<dyn Renderer>, config: Arc<ResolverConfig>) -> Self {
        let semaphore = Semaphore::new(config.max_concurrent_renders);
        Self {
            renderer,
            semaphore,
            config,
        }
    }

    /// Hard ceiling for one session: navigation plus settles plus slack for
    /// script evaluation and DOM collection.
    fn session_budget(&self) -> Duration {
        Duration::from_millis(self.config.nav_timeout_ms)
            + self.config.click_settle
            + self.config.render_settle
            + Duration::from_secs(10)
    }

    async fn run_session(&self, ctx: &mut dyn RenderContext, url: &str) -> ServerSet {
        match ctx.navigate(url, self.config.nav_timeout_ms).await {
            Ok(nav) => {
                debug!(url, final_url = %nav.final_url, ms = nav.load_time_ms, "Page rendered")
            }
            Err(e) => {
                warn!(url, error = %e, "Navigation failed");
                return ServerSet::new();
            }
        }

        // Best-effort: interstitial pages often hide links behind a button.
        match ctx.execute_js(&click_script()).await {
            Ok(label) if label.as_str().is_some_and(|l| !l.is_empty()) => {
                debug!(url, label = %label, "Clicked call-to-action");
                tokio::time::sleep(self.config.click_settle).await;
            }
            Ok(_) => {}
            Err(e) => debug!(url, error = %e, "Call-to-action click failed"),
        }

        // Client-side redirects and late DOM writes land during the settle.
        tokio::time::sleep(self.config.render_settle).await;

        let html = match ctx.html().await {
            Ok(html) => html,
            Err(e) => {
                warn!(url, error = %e, "Could not read rendered page");
                return ServerSet::new();
            }
        };

        let mut links = scan::anchor_candidates(&html, url, &self.config.preferred_servers);
        links.merge(scan::media_source_candidates(&html));
        for m in scan::host_matches(&html) {
            links.insert(scan::truncate(&m, 40), m);
        }
        links
    }
}

#[async_trait]
impl LinkExtractor for RenderExtractor {
    async fn extract(&self, master_ref: &str) -> ServerSet {
        // A direct file needs no rendering; the reference is the link.
        if is_direct_media(master_ref) {
            debug!(url = master_ref, "Direct media reference, skipping render");
            return ServerSet::new();
        }

        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Render semaphore closed");
                return ServerSet::new();
            }
        };

        let mut ctx = match self.renderer.new_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(url = master_ref, error = %e, "Could not open render context");
                return ServerSet::new();
            }
        };

        let links = match tokio::time::timeout(
            self.session_budget(),
            self.run_session(&mut *ctx, master_ref),
        )
        .await
        {
            Ok(links) => links,
            Err(_) => {
                warn!(url = master_ref, "Render session exceeded its budget");
                ServerSet::new()
            }
        };

        // Teardown happens on every path; a failed close never taints the
        // extraction result.
        if let Err(e) = ctx.close().await {
            warn!(url = master_ref, error = %e, "Render context teardown failed");
        }

        info!(url = master_ref, servers = links.len(), "Rendered extraction finished");
        links
    }

    fn name(&self) -> &str {
        "render"
    }
}
