//! Background staleness scanner.
//!
//! Walks all known items on an interval and re-resolves any whose cached
//! links are missing or expired, under a bounded worker cap so extraction
//! load stays flat. The loop survives every ordinary error and stops only
//! on an external signal, observed between passes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use playlink_common::ScannerConfig;
use playlink_store::{ItemStore, LinkCacheStore};

use crate::service::LinkService;

pub struct StalenessScanner {
    items: Arc<dyn ItemStore>,
    cache: Arc<dyn LinkCacheStore>,
    service: Arc<LinkService>,
    config: ScannerConfig,
}

impl StalenessScanner {
    pub fn new(
        items: Arc<dyn ItemStore>,
        cache: Arc<dyn LinkCacheStore>,
        service: Arc<LinkService>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            items,
            cache,
            service,
            config,
        }
    }

    /// Run until `stop` flips to true. The signal takes effect between
    /// passes, never mid-resolution.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(interval = ?self.config.interval, "Staleness scanner started");

        loop {
            if *stop.borrow() {
                break;
            }

            let delay = match self.scan_pass(Utc::now()).await {
                Ok(refreshed) => {
                    debug!(refreshed, "Scan pass complete");
                    self.config.interval
                }
                Err(e) => {
                    error!(error = %e, "Scan pass failed");
                    self.config.recovery_delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Staleness scanner stopped");
    }

    /// One pass with an explicit clock: select stale items, refresh them
    /// under the worker cap. Returns the number successfully refreshed.
    pub async fn scan_pass(&self, now: DateTime<Utc>) -> Result<usize> {
        let run_id = Uuid::new_v4();

        let mut stale = Vec::new();
        for id in self.items.list_item_ids().await? {
            match self.cache.entry(&id).await? {
                None => {
                    info!(%run_id, item_id = %id, "No cached links, scheduling refresh");
                    stale.push(id);
                }
                Some(entry) if entry.is_expired(now) => {
                    info!(%run_id, item_id = %id, "Cached links expired, scheduling refresh");
                    stale.push(id);
                }
                Some(_) => {}
            }
        }

        if stale.is_empty() {
            return Ok(0);
        }

        info!(%run_id, stale = stale.len(), "Refreshing stale items");

        let refreshed = AtomicUsize::new(0);
        stream::iter(stale)
            .for_each_concurrent(self.config.max_concurrent.max(1), |id| {
                let refreshed = &refreshed;
                async move {
                    match self.service.force_refresh(&id).await {
                        Ok(links) => {
                            info!(
                                %run_id,
                                item_id = %id,
                                servers = links.server_count(),
                                "Item refreshed"
                            );
                            refreshed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => {
                            warn!(%run_id, item_id = %id, error = %e, "Item refresh failed");
                        }
                    }
                }
            })
            .await;

        Ok(refreshed.into_inner())
    }
}
