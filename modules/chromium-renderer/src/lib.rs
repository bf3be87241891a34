//! Browser-engine abstraction for rendered link extraction.
//!
//! `Renderer` is a process-wide factory (launch once, reuse, shut down
//! explicitly); `RenderContext` is one disposable, isolated page owned by a
//! single extraction. Contexts are never reused across calls.

pub mod chromium;

pub use chromium::ChromiumRenderer;

use anyhow::Result;
use async_trait::async_trait;

/// Result of navigating a context to a URL.
#[derive(Debug, Clone)]
pub struct Navigation {
    /// Final URL after any redirects.
    pub final_url: String,
    pub load_time_ms: u64,
}

/// A browser engine that hands out isolated rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a fresh context (tab) with network filtering and a rotated
    /// identity already applied.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut the engine down. Idempotent.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// One isolated page for rendering a single master reference.
#[async_trait]
pub trait RenderContext: Send + Sync {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<Navigation>;
    /// Evaluate a script in the page and return its JSON result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Full rendered HTML of the current document.
    async fn html(&self) -> Result<String>;
    /// Release the context. Must be called on every exit path.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Renderer used when no browser binary is available. Static extraction
/// still works; rendered extraction degrades to empty results.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available"))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        0
    }
}
