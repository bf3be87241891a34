//! Library-level contract consumed by the presentation layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use playlink_common::{CacheEntry, CachePolicy, MediaItem, PlaylinkError, ServerMap};
use playlink_store::{ItemStore, LinkCacheStore};

use crate::resolve::LinkResolver;

/// How a lookup was answered.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Fresh resolved links straight from the cache.
    Cached { links: ServerMap, info: ServerInfo },
    /// No fresh cache; only the item's master references are available and a
    /// refresh is needed before direct playback.
    MasterOnly {
        masters: BTreeMap<String, String>,
        info: ServerInfo,
    },
    /// The item does not exist. Distinct from "exists but nothing resolved".
    NotFound,
}

/// Cache health metadata returned alongside every successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Cached links across all qualities.
    pub server_count: usize,
    /// True below the configured minimum — the caller should offer a refresh.
    pub needs_refresh: bool,
}

/// Master references plus the raw cache entry, fresh or stale.
#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    pub masters: Option<BTreeMap<String, String>>,
    pub cached: Option<CacheEntry>,
}

pub struct LinkService {
    items: Arc<dyn ItemStore>,
    cache: Arc<dyn LinkCacheStore>,
    resolver: Arc<LinkResolver>,
    policy: CachePolicy,
}

impl LinkService {
    pub fn new(
        items: Arc<dyn ItemStore>,
        cache: Arc<dyn LinkCacheStore>,
        resolver: Arc<LinkResolver>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            items,
            cache,
            resolver,
            policy,
        }
    }

    async fn server_info(&self, item_id: &str) -> Result<ServerInfo, PlaylinkError> {
        let count = self
            .cache
            .entry(item_id)
            .await?
            .map(|entry| entry.links.server_count())
            .unwrap_or(0);
        Ok(ServerInfo {
            server_count: count,
            needs_refresh: count < self.policy.min_servers,
        })
    }

    /// Answer a lookup from the cache when fresh, otherwise fall back to the
    /// item's master references. Never triggers extraction.
    pub async fn resolve(&self, item_id: &str) -> Result<Resolution, PlaylinkError> {
        let info = self.server_info(item_id).await?;

        if let Some(links) = self.cache.get(item_id, Utc::now()).await? {
            return Ok(Resolution::Cached { links, info });
        }

        match self.items.get_item(item_id).await? {
            Some(item) => Ok(Resolution::MasterOnly {
                masters: item.master_refs,
                info,
            }),
            None => Ok(Resolution::NotFound),
        }
    }

    /// Re-run extraction for every quality of the item, merge the results
    /// into the cache, and return the merged map. Bypasses freshness checks.
    pub async fn force_refresh(&self, item_id: &str) -> Result<ServerMap, PlaylinkError> {
        let item = self
            .items
            .get_item(item_id)
            .await?
            .ok_or_else(|| PlaylinkError::ItemNotFound(item_id.to_string()))?;

        self.refresh_item(&item).await
    }

    async fn refresh_item(&self, item: &MediaItem) -> Result<ServerMap, PlaylinkError> {
        let mut scraped = ServerMap::new();

        for (quality, master_ref) in &item.master_refs {
            let servers = self.resolver.resolve(master_ref).await;
            if servers.is_empty() {
                warn!(item_id = %item.id, quality = %quality, "No servers resolved");
            } else {
                info!(
                    item_id = %item.id,
                    quality = %quality,
                    servers = servers.len(),
                    "Quality resolved"
                );
            }
            // Empty qualities are recorded too: the merge keeps whatever the
            // cache already holds for them.
            scraped.insert(quality.clone(), servers);
        }

        let merged = self
            .cache
            .put(&item.id, &scraped, self.policy.ttl(), Utc::now())
            .await?;

        info!(
            item_id = %item.id,
            servers = merged.server_count(),
            "Refresh complete"
        );
        Ok(merged)
    }

    /// Master references plus the raw cache entry, for inspection tooling.
    pub async fn inspect(&self, item_id: &str) -> Result<ItemSnapshot, PlaylinkError> {
        let masters = self
            .items
            .get_item(item_id)
            .await?
            .map(|item| item.master_refs);
        let cached = self.cache.entry(item_id).await?;
        Ok(ItemSnapshot { masters, cached })
    }

    /// Register or replace an item. Quality values are trimmed; empties are
    /// dropped, and an item with no references at all is rejected.
    pub async fn upsert_item(
        &self,
        item_id: &str,
        master_refs: BTreeMap<String, String>,
    ) -> Result<(), PlaylinkError> {
        let master_refs: BTreeMap<String, String> = master_refs
            .into_iter()
            .map(|(q, url)| (q, url.trim().to_string()))
            .filter(|(_, url)| !url.is_empty())
            .collect();

        if master_refs.is_empty() {
            return Err(PlaylinkError::Validation(
                "at least one master reference is required".to_string(),
            ));
        }

        self.items.upsert_item(item_id, master_refs).await?;
        info!(item_id, "Item upserted");
        Ok(())
    }

    /// Remove an item's master data. Returns false when it did not exist.
    /// Any cache entry is left to expire on its own.
    pub async fn delete_item(&self, item_id: &str) -> Result<bool, PlaylinkError> {
        let deleted = self.items.delete_item(item_id).await?;
        if deleted {
            info!(item_id, "Item deleted");
        }
        Ok(deleted)
    }

    pub async fn search_items(&self, prefix: &str) -> Result<Vec<MediaItem>, PlaylinkError> {
        Ok(self.items.search_items(prefix).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{links, ScriptedExtractor};
    use playlink_common::ResolverConfig;
    use playlink_store::MemoryStore;
    use std::time::Duration;

    fn refs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(q, u)| (q.to_string(), u.to_string()))
            .collect()
    }

    fn service_with(page: ScriptedExtractor) -> (LinkService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(ResolverConfig {
            retry_backoff: Duration::ZERO,
            ..ResolverConfig::default()
        });
        let resolver = Arc::new(LinkResolver::new(
            Arc::new(page),
            Arc::new(ScriptedExtractor::new("render")),
            config,
        ));
        let service = LinkService::new(
            store.clone(),
            store.clone(),
            resolver,
            CachePolicy::default(),
        );
        (service, store)
    }

    #[tokio::test]
    async fn unknown_item_is_a_distinct_outcome() {
        let (service, _) = service_with(ScriptedExtractor::new("page"));
        assert!(matches!(
            service.resolve("nope").await.unwrap(),
            Resolution::NotFound
        ));
        assert!(matches!(
            service.force_refresh("nope").await,
            Err(PlaylinkError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn master_only_before_any_refresh() {
        let (service, _) = service_with(ScriptedExtractor::new("page"));
        service
            .upsert_item("ep1", refs(&[("720", "http://up/ep1-720")]))
            .await
            .unwrap();

        match service.resolve("ep1").await.unwrap() {
            Resolution::MasterOnly { masters, info } => {
                assert_eq!(masters.get("720").unwrap(), "http://up/ep1-720");
                assert_eq!(info.server_count, 0);
                assert!(info.needs_refresh);
            }
            other => panic!("expected MasterOnly, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn force_refresh_resolves_every_quality_and_caches() {
        let page = ScriptedExtractor::new("page")
            .with_result(links(&[("pixel", "http://a/480"), ("fsl", "http://b/480")]))
            .with_result(links(&[("pixel", "http://a/720"), ("fsl", "http://b/720")]));
        let (service, _) = service_with(page);

        service
            .upsert_item(
                "ep1",
                refs(&[("480", "http://up/480"), ("720", "http://up/720")]),
            )
            .await
            .unwrap();

        let merged = service.force_refresh("ep1").await.unwrap();
        assert_eq!(merged.server_count(), 4);

        match service.resolve("ep1").await.unwrap() {
            Resolution::Cached { links, info } => {
                assert_eq!(links.server_count(), 4);
                assert_eq!(info.server_count, 4);
                assert!(info.needs_refresh); // below the default minimum of 9
            }
            other => panic!("expected Cached, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enough_servers_clears_the_refresh_flag() {
        let many: Vec<(String, String)> = (0..9)
            .map(|i| (format!("pixel{i}"), format!("http://a/{i}")))
            .collect();
        let set: playlink_common::ServerSet = many.into_iter().collect();
        let page = ScriptedExtractor::new("page").with_default(set);
        let (service, _) = service_with(page);

        service
            .upsert_item("ep1", refs(&[("480", "http://up/480")]))
            .await
            .unwrap();
        service.force_refresh("ep1").await.unwrap();

        match service.resolve("ep1").await.unwrap() {
            Resolution::Cached { info, .. } => {
                assert_eq!(info.server_count, 9);
                assert!(!info.needs_refresh);
            }
            other => panic!("expected Cached, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_refresh_accumulates_servers() {
        let page = ScriptedExtractor::new("page")
            .with_result(links(&[("pixel", "http://a/1")]))
            .with_result(links(&[("fsl", "http://b/1")]));
        let (service, _) = service_with(page);

        service
            .upsert_item("ep1", refs(&[("480", "http://up/480")]))
            .await
            .unwrap();

        service.force_refresh("ep1").await.unwrap();
        let merged = service.force_refresh("ep1").await.unwrap();

        // The first round's server survives the second round's merge.
        let q = merged.get("480").unwrap();
        assert_eq!(q.get("pixel"), Some("http://a/1"));
        assert_eq!(q.get("fsl"), Some("http://b/1"));
    }

    #[tokio::test]
    async fn upsert_rejects_items_without_references() {
        let (service, _) = service_with(ScriptedExtractor::new("page"));

        let result = service
            .upsert_item("ep1", refs(&[("480", "   ")]))
            .await;
        assert!(matches!(result, Err(PlaylinkError::Validation(_))));
    }

    #[tokio::test]
    async fn inspect_shows_masters_and_raw_cache() {
        let page =
            ScriptedExtractor::new("page").with_default(links(&[("pixel", "http://a/1")]));
        let (service, _) = service_with(page);

        service
            .upsert_item("ep1", refs(&[("480", "http://up/480")]))
            .await
            .unwrap();
        service.force_refresh("ep1").await.unwrap();

        let snapshot = service.inspect("ep1").await.unwrap();
        assert!(snapshot.masters.is_some());
        assert_eq!(snapshot.cached.unwrap().links.server_count(), 1);

        let missing = service.inspect("nope").await.unwrap();
        assert!(missing.masters.is_none());
        assert!(missing.cached.is_none());
    }
}
