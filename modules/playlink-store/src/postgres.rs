//! Postgres persistence for items and the link cache.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::warn;

use playlink_common::{CacheEntry, MediaItem, ServerMap};

use crate::traits::{ItemStore, LinkCacheStore};

pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: String,
    master_refs: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl ItemRow {
    fn into_item(self) -> MediaItem {
        let master_refs: BTreeMap<String, String> = serde_json::from_value(self.master_refs)
            .unwrap_or_else(|e| {
                warn!(item_id = %self.id, error = %e, "Unreadable master_refs payload");
                BTreeMap::new()
            });
        MediaItem {
            id: self.id,
            master_refs,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CacheRow {
    item_id: String,
    links: serde_json::Value,
    updated_at: DateTime<Utc>,
    expire_at: DateTime<Utc>,
}

impl CacheRow {
    fn into_entry(self) -> CacheEntry {
        let links: ServerMap = serde_json::from_value(self.links).unwrap_or_else(|e| {
            warn!(item_id = %self.item_id, error = %e, "Unreadable cache payload");
            ServerMap::new()
        });
        CacheEntry {
            links,
            updated_at: self.updated_at,
            expire_at: self.expire_at,
        }
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("migration failed")?;
        Ok(())
    }
}

#[async_trait]
impl ItemStore for PgStore {
    async fn get_item(&self, id: &str) -> Result<Option<MediaItem>> {
        let row = sqlx::query_as::<_, ItemRow>(
            "SELECT id, master_refs, created_at FROM media_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ItemRow::into_item))
    }

    async fn upsert_item(&self, id: &str, master_refs: BTreeMap<String, String>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO media_items (id, master_refs, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
                SET master_refs = EXCLUDED.master_refs,
                    created_at = EXCLUDED.created_at
            "#,
        )
        .bind(id)
        .bind(serde_json::to_value(&master_refs)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_item_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM media_items ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn search_items(&self, prefix: &str) -> Result<Vec<MediaItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, master_refs, created_at FROM media_items
            WHERE id LIKE $1 || '%'
            ORDER BY id
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ItemRow::into_item).collect())
    }
}

#[async_trait]
impl LinkCacheStore for PgStore {
    async fn get(&self, item_id: &str, now: DateTime<Utc>) -> Result<Option<ServerMap>> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT item_id, links, updated_at, expire_at FROM link_cache
            WHERE item_id = $1 AND expire_at > $2
            "#,
        )
        .bind(item_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_entry().links))
    }

    async fn entry(&self, item_id: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, CacheRow>(
            "SELECT item_id, links, updated_at, expire_at FROM link_cache WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CacheRow::into_entry))
    }

    async fn put(
        &self,
        item_id: &str,
        links: &ServerMap,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<ServerMap> {
        // Row lock makes the read-merge-write a critical section per item;
        // concurrent puts for the same item serialize instead of losing links.
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT links FROM link_cache WHERE item_id = $1 FOR UPDATE",
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut merged = match existing {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(item_id, error = %e, "Discarding unreadable cache payload");
                ServerMap::new()
            }),
            None => ServerMap::new(),
        };
        merged.merge(links.clone());

        sqlx::query(
            r#"
            INSERT INTO link_cache (item_id, links, updated_at, expire_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (item_id) DO UPDATE
                SET links = EXCLUDED.links,
                    updated_at = EXCLUDED.updated_at,
                    expire_at = EXCLUDED.expire_at
            "#,
        )
        .bind(item_id)
        .bind(serde_json::to_value(&merged)?)
        .bind(now)
        .bind(now + ttl)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(merged)
    }

    async fn delete(&self, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM link_cache WHERE item_id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
