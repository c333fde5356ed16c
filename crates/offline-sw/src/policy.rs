//! Interception Policy: cache, network or offline fallback per request.
//!
//! ```text
//! non-GET ──────────────────────────────▶ Passthrough
//! GET ─▶ cache hit ─────────────────────▶ Respond(Cache)
//!      └ miss ─▶ network ok ────────────▶ Respond(Network)  (+ detached cache write if 200/basic)
//!               └ network failed ─▶ document ─▶ shell hit ▶ Respond(OfflineShell)
//!                                  │           └ shell miss ▶ NoResponse
//!                                  └ other ───────────────▶ Err(network)
//! ```

use std::sync::Arc;

use http::{Method, StatusCode};
use offline_common::{OfflineError, Result};
use offline_net::{cache_key, Network, Request, Response, ResponseType, Url};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::{EventSink, WorkerEvent};

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Cached root page substituted for a failed navigation.
    OfflineShell,
}

/// Result of intercepting one request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host sends the request to the network itself.
    Passthrough,
    /// Answer the page with this response.
    Respond {
        response: Response,
        source: ResponseSource,
    },
    /// Intercepted, but there is nothing usable to answer with.
    NoResponse,
}

impl FetchOutcome {
    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Respond { source, .. } => Some(*source),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond { response, .. } => Some(response),
            _ => None,
        }
    }
}

/// Whether a live response may be stored.
pub fn is_cacheable(response: &Response) -> bool {
    response.status == StatusCode::OK
        && response.response_type == ResponseType::Basic
        && !response.redirected
}

/// Per-request decision engine.
///
/// Holds no per-request state; one instance serves all concurrent requests.
pub struct InterceptionPolicy {
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    version: String,
    shell_url: Url,
    events: EventSink,
}

impl InterceptionPolicy {
    pub fn new(
        store: Arc<dyn CacheStore>,
        network: Arc<dyn Network>,
        version: impl Into<String>,
        shell_url: Url,
    ) -> Self {
        Self {
            store,
            network,
            version: version.into(),
            shell_url,
            events: EventSink::default(),
        }
    }

    /// Report background cache writes on `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Decide the response for one intercepted request.
    pub async fn handle(&self, request: &Request) -> Result<FetchOutcome> {
        if request.method != Method::GET {
            return Ok(FetchOutcome::Passthrough);
        }

        let key = request.cache_key();

        match self.store.match_request(&key).await {
            Ok(Some(entry)) => {
                debug!(url = %request.url, "Serving from cache");
                return Ok(FetchOutcome::Respond {
                    response: entry.to_response(),
                    source: ResponseSource::Cache,
                });
            }
            Ok(None) => {}
            Err(e) => {
                // A broken store must not hang or fail the page request.
                warn!(url = %request.url, error = %e, "Cache lookup failed, using network");
            }
        }

        debug!(url = %request.url, "Loading from network");
        match self.network.fetch(request).await {
            Ok(response) => {
                if is_cacheable(&response) {
                    self.spawn_cache_write(key, request.url.clone(), response.duplicate());
                }
                Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => self.offline_fallback(request, e.into()).await,
        }
    }

    async fn offline_fallback(
        &self,
        request: &Request,
        error: OfflineError,
    ) -> Result<FetchOutcome> {
        if !request.destination.is_document() {
            debug!(
                url = %request.url,
                destination = %request.destination,
                "Network failed, no fallback for sub-resource"
            );
            return Err(error);
        }

        info!(url = %request.url, error = %error, "Network failed, serving offline shell");
        match self.store.match_request(&cache_key(&self.shell_url)).await {
            Ok(Some(entry)) => Ok(FetchOutcome::Respond {
                response: entry.to_response(),
                source: ResponseSource::OfflineShell,
            }),
            Ok(None) => Ok(FetchOutcome::NoResponse),
            Err(e) => {
                warn!(error = %e, "Offline shell lookup failed");
                Ok(FetchOutcome::NoResponse)
            }
        }
    }

    /// Store `copy` without delaying the response to the page.
    fn spawn_cache_write(&self, key: String, url: Url, copy: Response) {
        let store = Arc::clone(&self.store);
        let version = self.version.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let entry = CacheEntry::from_response(url, copy);
            match store.put(&version, &key, entry).await {
                Ok(()) => {
                    debug!(key = %key, generation = %version, "Cached network response");
                    events.emit(WorkerEvent::CacheWriteCompleted { key });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Background cache write failed");
                    events.emit(WorkerEvent::CacheWriteFailed {
                        key,
                        error: e.to_string(),
                    });
                }
            }
        });
    }
}
