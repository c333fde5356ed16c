//! # Offline Worker
//!
//! Offline support for a web application: intercepts requests from the pages
//! it controls, answers from a versioned local cache when possible, falls
//! back to the network, and fills the cache as responses arrive.
//!
//! ## Features
//!
//! - **Precache**: seed a new generation with the deploy manifest on install
//! - **Generation reap**: delete every stale generation on activate
//! - **Interception**: cache-first GET handling with an offline shell for
//!   failed navigations
//! - **Notifications**: push display and click routing via host collaborators
//!
//! ## Architecture
//!
//! ```text
//! WorkerHost (lifecycle state, event dispatch)
//!     │
//!     └── OfflineWorker
//!             ├── PrecacheLoader     ── on_install
//!             ├── GenerationReaper   ── on_activate
//!             ├── InterceptionPolicy ── on_fetch
//!             └── NotificationSink / ClientWindows ── on_push / on_notification_click
//!
//! CacheStore (generations)
//!     └── Cache
//!             └── identity → CacheEntry
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

pub mod cache;
pub mod config;
pub mod host;
pub mod notification;
pub mod policy;
pub mod precache;
pub mod reaper;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{Cache, CacheEntry, CacheStore, MemoryCacheStorage};
pub use config::{NotificationConfig, OfflineConfig};
pub use host::{HostEvent, WorkerHost};
pub use notification::{
    ClientWindows, NotificationAction, NotificationClick, NotificationData, NotificationId,
    NotificationOptions, NotificationSink, PushMessage,
};
pub use policy::{is_cacheable, FetchOutcome, InterceptionPolicy, ResponseSource};
pub use precache::{PrecacheLoader, PrecacheReport};
pub use reaper::{GenerationReaper, ReapReport};
pub use worker::OfflineWorker;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Script evaluated, nothing run yet.
    #[default]
    Parsed,
    /// Install event running (precache).
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Activate event running (reap).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced by a newer worker.
    Redundant,
}

impl ServiceWorkerState {
    /// Check if fetches should be intercepted.
    pub fn is_active(&self) -> bool {
        *self == ServiceWorkerState::Activated
    }
}

/// Worker events.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Lifecycle state changed.
    StateChange {
        generation: String,
        new_state: ServiceWorkerState,
    },
    PrecacheCompleted {
        generation: String,
        entries: usize,
    },
    PrecacheFailed {
        generation: String,
        error: String,
    },
    GenerationDeleted {
        generation: String,
    },
    /// A detached cache write finished.
    CacheWriteCompleted {
        key: String,
    },
    CacheWriteFailed {
        key: String,
        error: String,
    },
    NotificationShown {
        id: NotificationId,
    },
    WindowOpened {
        url: Url,
    },
}

/// Optional sender for [`WorkerEvent`]s. Dropped receivers are ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<WorkerEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver it feeds.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: WorkerEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_parsed() {
        assert_eq!(ServiceWorkerState::default(), ServiceWorkerState::Parsed);
        assert!(!ServiceWorkerState::Installed.is_active());
        assert!(ServiceWorkerState::Activated.is_active());
    }

    #[tokio::test]
    async fn test_event_sink_delivers() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(WorkerEvent::GenerationDeleted {
            generation: "v0".into(),
        });
        assert_eq!(
            rx.recv().await,
            Some(WorkerEvent::GenerationDeleted {
                generation: "v0".into()
            })
        );
    }

    #[test]
    fn test_default_sink_discards() {
        EventSink::default().emit(WorkerEvent::CacheWriteCompleted { key: "k".into() });
    }
}
