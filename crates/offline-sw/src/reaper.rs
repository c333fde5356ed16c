//! Generation Reaper: deletes every cache generation except the current one.

use std::sync::Arc;

use futures::future::join_all;
use offline_common::Result;
use tracing::{info, warn};

use crate::cache::CacheStore;

/// What a reap pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Current generation, if it exists.
    pub kept: Option<String>,
    /// Stale generations removed.
    pub deleted: Vec<String>,
    /// Stale generations whose deletion failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl ReapReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Removes obsolete generations on activation.
pub struct GenerationReaper {
    store: Arc<dyn CacheStore>,
    version: String,
}

impl GenerationReaper {
    pub fn new(store: Arc<dyn CacheStore>, version: impl Into<String>) -> Self {
        Self {
            store,
            version: version.into(),
        }
    }

    /// Delete all stale generations concurrently and wait for every deletion.
    ///
    /// Only listing the generations can fail the pass; individual deletion
    /// failures are logged and reported, and leave that generation for the
    /// next activation.
    pub async fn run(&self) -> Result<ReapReport> {
        let names = self.store.keys().await?;

        let mut report = ReapReport::default();
        let mut stale = Vec::new();
        for name in names {
            if name == self.version {
                report.kept = Some(name);
            } else {
                stale.push(name);
            }
        }

        let deletions = stale.into_iter().map(|name| async move {
            info!(generation = %name, "Deleting stale cache generation");
            let result = self.store.delete(&name).await;
            (name, result)
        });

        for (name, result) in join_all(deletions).await {
            match result {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    warn!(generation = %name, error = %e, "Failed to delete cache generation");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
