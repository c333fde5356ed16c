//! Precache Loader: seeds a fresh generation with the deploy manifest.

use std::sync::Arc;

use futures::future::try_join_all;
use offline_common::{OfflineError, Result};
use offline_net::{cache_key, Network, Request, Url};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore};

/// Outcome of a successful precache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheReport {
    /// Generation that was seeded.
    pub generation: String,
    /// Identities stored, in manifest order.
    pub stored: Vec<String>,
}

/// Populates the current generation with every manifest entry.
///
/// All manifest entries are fetched before anything is written. If any fetch
/// fails or returns a non-2xx status nothing is stored. If a write fails, a
/// generation created by this run is deleted again, so a failed precache
/// never leaves a partial generation behind.
pub struct PrecacheLoader {
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    version: String,
    manifest: Vec<Url>,
}

impl PrecacheLoader {
    pub fn new(
        store: Arc<dyn CacheStore>,
        network: Arc<dyn Network>,
        version: impl Into<String>,
        manifest: Vec<Url>,
    ) -> Self {
        Self {
            store,
            network,
            version: version.into(),
            manifest,
        }
    }

    /// Fetch and store the whole manifest.
    pub async fn run(&self) -> Result<PrecacheReport> {
        if self.manifest.is_empty() {
            return Err(OfflineError::InvalidArgument(
                "precache manifest is empty".to_string(),
            ));
        }

        info!(
            generation = %self.version,
            entries = self.manifest.len(),
            "Precaching manifest"
        );

        let fetches = self.manifest.iter().map(|url| self.fetch_entry(url));
        let entries = try_join_all(fetches).await?;

        let existed = self.store.has(&self.version).await?;
        let mut stored = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            if let Err(e) = self.store.put(&self.version, &key, entry).await {
                if !existed {
                    self.discard_partial().await;
                }
                return Err(e);
            }
            stored.push(key);
        }

        info!(generation = %self.version, stored = stored.len(), "Precache complete");

        Ok(PrecacheReport {
            generation: self.version.clone(),
            stored,
        })
    }

    /// Drop a generation this run created but could not complete.
    async fn discard_partial(&self) {
        match self.store.delete(&self.version).await {
            Ok(_) => info!(generation = %self.version, "Discarded partial precache"),
            Err(e) => warn!(
                generation = %self.version,
                error = %e,
                "Failed to discard partial precache"
            ),
        }
    }

    async fn fetch_entry(&self, url: &Url) -> Result<(String, CacheEntry)> {
        let request = Request::get(url.clone());
        let response = self.network.fetch(&request).await?;

        if !response.ok() {
            return Err(OfflineError::network(format!(
                "precache of {} returned {}",
                url, response.status
            )));
        }

        debug!(url = %url, status = %response.status, "Fetched manifest entry");
        let key = cache_key(url);
        Ok((key, CacheEntry::from_response(url.clone(), response)))
    }
}
