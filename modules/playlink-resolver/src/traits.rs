// Extractor seam for the resolution pipeline.
//
// Both extraction strategies sit behind one trait so the resolver can be
// tested deterministically with scripted doubles: no network, no browser.

use async_trait::async_trait;

use playlink_common::ServerSet;

/// Derives candidate server links from one master reference.
///
/// Extractors never fail past this boundary: upstream errors degrade to an
/// empty set and are logged inside the implementation.
#[async_trait]
pub trait LinkExtractor: Send + Sync {
    async fn extract(&self, master_ref: &str) -> ServerSet;
    fn name(&self) -> &str;
}
