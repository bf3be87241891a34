// Store contracts for master data and the link cache.
//
// Master items are durable, operator-managed records. Cache entries are
// derived and disposable — they can always be rebuilt from an item's master
// references, so deleting one is safe. Implementations take `now` explicitly
// so expiry behavior is testable without sleeping.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use playlink_common::{CacheEntry, MediaItem, ServerMap};

#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn get_item(&self, id: &str) -> Result<Option<MediaItem>>;

    /// Insert or replace the quality → master reference map for an item.
    async fn upsert_item(&self, id: &str, master_refs: BTreeMap<String, String>) -> Result<()>;

    /// Returns true when an item was actually removed.
    async fn delete_item(&self, id: &str) -> Result<bool>;

    async fn list_item_ids(&self) -> Result<Vec<String>>;

    /// Items whose id starts with the given prefix.
    async fn search_items(&self, prefix: &str) -> Result<Vec<MediaItem>>;
}

#[async_trait]
pub trait LinkCacheStore: Send + Sync {
    /// Fresh links only: absent when no entry exists or its expiry has
    /// passed. Reading never deletes — reaping stale rows is the scanner's
    /// or an administrator's job.
    async fn get(&self, item_id: &str, now: DateTime<Utc>) -> Result<Option<ServerMap>>;

    /// Raw entry, expired or not.
    async fn entry(&self, item_id: &str) -> Result<Option<CacheEntry>>;

    /// Deep-merge `links` into the stored map: new qualities insert
    /// wholesale, existing qualities merge by server name with incoming
    /// values winning. Resets `updated_at`/`expire_at` on every call, even
    /// when the merge adds nothing. The read-merge-write is a single
    /// critical section per item. Returns the merged map.
    async fn put(
        &self,
        item_id: &str,
        links: &ServerMap,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<ServerMap>;

    async fn delete(&self, item_id: &str) -> Result<()>;
}
