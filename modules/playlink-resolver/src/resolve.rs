//! Resolution orchestration for a single master reference.
//!
//! Cost-aware: the cheap passive extraction always runs first and the
//! rendered path only fires when it under-delivers. The whole sequence is
//! retried rather than failed — upstream pages are flaky by nature — and an
//! empty outcome is valid, meaning "no servers currently resolvable".

use std::sync::Arc;

use tracing::{debug, info};

use playlink_common::{ResolverConfig, ServerSet};

use crate::traits::LinkExtractor;

pub struct LinkResolver {
    page_extractor: Arc<dyn LinkExtractor>,
    render_extractor: Arc<dyn LinkExtractor>,
    config: Arc<ResolverConfig>,
}

impl LinkResolver {
    pub fn new(
        page_extractor: Arc<dyn LinkExtractor>,
        render_extractor: Arc<dyn LinkExtractor>,
        config: Arc<ResolverConfig>,
    ) -> Self {
        Self {
            page_extractor,
            render_extractor,
            config,
        }
    }

    /// Resolve one master reference into named server links.
    pub async fn resolve(&self, master_ref: &str) -> ServerSet {
        let mut found = ServerSet::new();

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                info!(url = master_ref, attempt = attempt + 1, "Retrying resolution");
                tokio::time::sleep(self.config.retry_backoff).await;
            }

            let page_links = self.page_extractor.extract(master_ref).await;
            if !page_links.is_empty() {
                debug!(
                    url = master_ref,
                    extractor = self.page_extractor.name(),
                    servers = page_links.len(),
                    "Merging extracted links"
                );
                found.merge(reorder_by_priority(
                    page_links,
                    &self.config.preferred_servers,
                ));
            }

            if found.len() < self.config.dynamic_threshold {
                let rendered = self.render_extractor.extract(master_ref).await;
                if !rendered.is_empty() {
                    debug!(
                        url = master_ref,
                        extractor = self.render_extractor.name(),
                        servers = rendered.len(),
                        "Merging extracted links"
                    );
                    found.merge(rendered);
                }
            }

            if found.len() >= self.config.min_results {
                break;
            }
        }

        info!(url = master_ref, servers = found.len(), "Resolution complete");
        found
    }
}

/// Front-load links matching the priority list. Links matching an earlier
/// key come first; order within one key is preserved, and unmatched links
/// keep their relative order at the back.
pub fn reorder_by_priority(links: ServerSet, priorities: &[String]) -> ServerSet {
    let mut remaining = links.into_links();
    let mut ordered = Vec::with_capacity(remaining.len());

    for key in priorities {
        let key = key.to_lowercase();
        let mut i = 0;
        while i < remaining.len() {
            let link = &remaining[i];
            if link.name.to_lowercase().contains(&key) || link.url.to_lowercase().contains(&key) {
                ordered.push(remaining.remove(i));
            } else {
                i += 1;
            }
        }
    }
    ordered.extend(remaining);

    ordered.into_iter().map(|l| (l.name, l.url)).collect()
}
