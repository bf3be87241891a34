//! In-memory store. Backs tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use playlink_common::{CacheEntry, MediaItem, ServerMap};

use crate::traits::{ItemStore, LinkCacheStore};

struct Inner {
    items: BTreeMap<String, MediaItem>,
    cache: HashMap<String, CacheEntry>,
}

/// Thread-safe in-memory implementation of both store contracts.
/// `put` holds the lock across its read-merge-write, so concurrent merges
/// for the same item cannot interleave.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: BTreeMap::new(),
                cache: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn get_item(&self, id: &str) -> Result<Option<MediaItem>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.items.get(id).cloned())
    }

    async fn upsert_item(&self, id: &str, master_refs: BTreeMap<String, String>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.items.insert(
            id.to_string(),
            MediaItem {
                id: id.to_string(),
                master_refs,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.items.remove(id).is_some())
    }

    async fn list_item_ids(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.items.keys().cloned().collect())
    }

    async fn search_items(&self, prefix: &str) -> Result<Vec<MediaItem>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .items
            .values()
            .filter(|item| item.id.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LinkCacheStore for MemoryStore {
    async fn get(&self, item_id: &str, now: DateTime<Utc>) -> Result<Option<ServerMap>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .cache
            .get(item_id)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.links.clone()))
    }

    async fn entry(&self, item_id: &str) -> Result<Option<CacheEntry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.cache.get(item_id).cloned())
    }

    async fn put(
        &self,
        item_id: &str,
        links: &ServerMap,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<ServerMap> {
        let mut inner = self.inner.lock().unwrap();
        let mut merged = inner
            .cache
            .get(item_id)
            .map(|entry| entry.links.clone())
            .unwrap_or_default();
        merged.merge(links.clone());

        inner.cache.insert(
            item_id.to_string(),
            CacheEntry {
                links: merged.clone(),
                updated_at: now,
                expire_at: now + ttl,
            },
        );
        Ok(merged)
    }

    async fn delete(&self, item_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.cache.remove(item_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playlink_common::ServerSet;

    fn map(quality: &str, pairs: &[(&str, &str)]) -> ServerMap {
        let mut m = ServerMap::new();
        m.insert(
            quality,
            pairs
                .iter()
                .map(|(n, u)| (n.to_string(), u.to_string()))
                .collect::<ServerSet>(),
        );
        m
    }

    #[tokio::test]
    async fn put_merge_is_idempotent() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let x = map("480", &[("a", "u1"), ("b", "u2")]);

        let first = store.put("ep1", &x, Duration::seconds(60), now).await.unwrap();
        let second = store.put("ep1", &x, Duration::seconds(60), now).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.server_count(), 2);
    }

    #[tokio::test]
    async fn put_accumulates_across_calls() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .put("ep1", &map("480", &[("a", "u1")]), Duration::seconds(60), now)
            .await
            .unwrap();
        let merged = store
            .put("ep1", &map("480", &[("b", "u2")]), Duration::seconds(60), now)
            .await
            .unwrap();

        let q = merged.get("480").unwrap();
        assert_eq!(q.get("a"), Some("u1"));
        assert_eq!(q.get("b"), Some("u2"));
    }

    #[tokio::test]
    async fn put_overwrites_same_named_server() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .put("ep1", &map("480", &[("a", "u1")]), Duration::seconds(60), now)
            .await
            .unwrap();
        let merged = store
            .put("ep1", &map("480", &[("a", "u2")]), Duration::seconds(60), now)
            .await
            .unwrap();

        let q = merged.get("480").unwrap();
        assert_eq!(q.get("a"), Some("u2"));
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn qualities_resolve_independently() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .put("ep1", &map("480", &[("a", "u1")]), Duration::seconds(60), now)
            .await
            .unwrap();
        let merged = store
            .put("ep1", &map("720", &[("a", "u2")]), Duration::seconds(60), now)
            .await
            .unwrap();

        assert_eq!(merged.get("480").unwrap().get("a"), Some("u1"));
        assert_eq!(merged.get("720").unwrap().get("a"), Some("u2"));
    }

    #[tokio::test]
    async fn get_hides_expired_entries_without_deleting() {
        let store = MemoryStore::new();
        let t0 = Utc::now();

        store
            .put("ep1", &map("480", &[("a", "u1")]), Duration::seconds(1), t0)
            .await
            .unwrap();

        assert!(store.get("ep1", t0).await.unwrap().is_some());
        assert!(store
            .get("ep1", t0 + Duration::seconds(2))
            .await
            .unwrap()
            .is_none());
        // The raw entry is still there — reads do not reap
        assert!(store.entry("ep1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn every_put_resets_the_expiry_clock() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let x = map("480", &[("a", "u1")]);

        store.put("ep1", &x, Duration::seconds(10), t0).await.unwrap();
        // Same payload again, later: merge adds nothing but expiry advances
        let t1 = t0 + Duration::seconds(8);
        store.put("ep1", &x, Duration::seconds(10), t1).await.unwrap();

        let entry = store.entry("ep1").await.unwrap().unwrap();
        assert_eq!(entry.updated_at, t1);
        assert_eq!(entry.expire_at, t1 + Duration::seconds(10));
    }

    #[tokio::test]
    async fn delete_then_get_is_absent() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .put("ep1", &map("480", &[("a", "u1")]), Duration::seconds(60), now)
            .await
            .unwrap();
        store.delete("ep1").await.unwrap();

        assert!(store.get("ep1", now).await.unwrap().is_none());
        assert!(store.entry("ep1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn item_crud_roundtrip() {
        let store = MemoryStore::new();
        let refs: BTreeMap<String, String> =
            [("720".to_string(), "https://up/ep1-720".to_string())]
                .into_iter()
                .collect();

        store.upsert_item("drama:1", refs.clone()).await.unwrap();
        store.upsert_item("drama:2", refs.clone()).await.unwrap();
        store.upsert_item("other:1", refs).await.unwrap();

        let item = store.get_item("drama:1").await.unwrap().unwrap();
        assert_eq!(item.master_refs.get("720").unwrap(), "https://up/ep1-720");

        assert_eq!(store.list_item_ids().await.unwrap().len(), 3);
        assert_eq!(store.search_items("drama:").await.unwrap().len(), 2);

        assert!(store.delete_item("drama:1").await.unwrap());
        assert!(!store.delete_item("drama:1").await.unwrap());
        assert!(store.get_item("drama:1").await.unwrap().is_none());
    }
}
