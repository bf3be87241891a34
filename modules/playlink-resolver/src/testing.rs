// Test doubles for the resolution pipeline.
//
// ScriptedExtractor (LinkExtractor) — queued results plus call accounting,
// with an optional hold so tests can observe in-flight windows.
// ScriptedRenderer (Renderer/RenderContext) — fixed rendered HTML with
// failure/hang modes and open/close accounting.
// No network, no browser; `cargo test` stays hermetic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;

use chromium_renderer::{Navigation, RenderContext, Renderer};
use playlink_common::ServerSet;

use crate::traits::LinkExtractor;

/// Build a ServerSet from name/url pairs.
pub fn links(pairs: &[(&str, &str)]) -> ServerSet {
    pairs
        .iter()
        .map(|(n, u)| (n.to_string(), u.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// ScriptedExtractor
// ---------------------------------------------------------------------------

/// Extractor returning queued results in order, then a default (empty unless
/// set). Records call count and per-call in-flight windows.
pub struct ScriptedExtractor {
    name: &'static str,
    queued: Mutex<VecDeque<ServerSet>>,
    default: ServerSet,
    hold: Option<Duration>,
    calls: AtomicUsize,
    windows: Mutex<Vec<(Instant, Instant)>>,
}

impl ScriptedExtractor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            queued: Mutex::new(VecDeque::new()),
            default: ServerSet::new(),
            hold: None,
            calls: AtomicUsize::new(0),
            windows: Mutex::new(Vec::new()),
        }
    }

    /// Queue the result for the next unanswered call.
    pub fn with_result(self, result: ServerSet) -> Self {
        self.queued.lock().unwrap().push_back(result);
        self
    }

    /// Result for calls past the end of the queue.
    pub fn with_default(mut self, result: ServerSet) -> Self {
        self.default = result;
        self
    }

    /// Keep each call in flight for this long before answering.
    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Start/end instants of every call, in completion order.
    pub fn windows(&self) -> Vec<(Instant, Instant)> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkExtractor for ScriptedExtractor {
    async fn extract(&self, _master_ref: &str) -> ServerSet {
        let started = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(hold) = self.hold {
            tokio::time::sleep(hold).await;
        }

        let result = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        self.windows.lock().unwrap().push((started, Instant::now()));
        result
    }

    fn name(&self) -> &str {
        self.name
    }
}

// ---------------------------------------------------------------------------
// ScriptedRenderer
// ---------------------------------------------------------------------------

/// Renderer whose contexts serve a fixed HTML document.
pub struct ScriptedRenderer {
    html: String,
    click_result: serde_json::Value,
    fail_navigation: bool,
    hang_navigation: bool,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl ScriptedRenderer {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            click_result: serde_json::Value::Null,
            fail_navigation: false,
            hang_navigation: false,
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report this label as the clicked call-to-action.
    pub fn with_click(mut self, label: &str) -> Self {
        self.click_result = serde_json::Value::String(label.to_string());
        self
    }

    /// Every navigation fails immediately.
    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    /// Every navigation hangs until the caller's budget expires.
    pub fn hanging_navigation(mut self) -> Self {
        self.hang_navigation = true;
        self
    }

    pub fn contexts_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn contexts_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedContext {
            html: self.html.clone(),
            click_result: self.click_result.clone(),
            fail_navigation: self.fail_navigation,
            hang_navigation: self.hang_navigation,
            closed: Arc::clone(&self.closed),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.contexts_opened() - self.contexts_closed()
    }
}

struct ScriptedContext {
    html: String,
    click_result: serde_json::Value,
    fail_navigation: bool,
    hang_navigation: bool,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<Navigation> {
        if self.hang_navigation {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
        if self.fail_navigation {
            bail!("scripted navigation failure");
        }
        Ok(Navigation {
            final_url: url.to_string(),
            load_time_ms: 1,
        })
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(self.click_result.clone())
    }

    async fn html(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
