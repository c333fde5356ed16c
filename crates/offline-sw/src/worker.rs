//! The offline worker: one named handler per host event.

use std::sync::Arc;

use offline_common::Result;
use offline_net::{Network, Request};
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::OfflineConfig;
use crate::notification::{
    ClientWindows, NotificationClick, NotificationId, NotificationOptions, NotificationSink,
    PushMessage,
};
use crate::policy::{FetchOutcome, InterceptionPolicy};
use crate::precache::{PrecacheLoader, PrecacheReport};
use crate::reaper::{GenerationReaper, ReapReport};
use crate::{EventSink, WorkerEvent};

/// Host-agnostic worker logic.
///
/// Holds only its collaborators; all durable state lives in the cache store.
pub struct OfflineWorker {
    config: OfflineConfig,
    precache: PrecacheLoader,
    reaper: GenerationReaper,
    policy: InterceptionPolicy,
    notifications: Arc<dyn NotificationSink>,
    windows: Arc<dyn ClientWindows>,
    events: EventSink,
}

impl OfflineWorker {
    /// Wire a worker for `config.version` over the given collaborators.
    pub fn new(
        config: OfflineConfig,
        store: Arc<dyn CacheStore>,
        network: Arc<dyn Network>,
        notifications: Arc<dyn NotificationSink>,
        windows: Arc<dyn ClientWindows>,
    ) -> Result<Self> {
        config.validate()?;

        let precache = PrecacheLoader::new(
            Arc::clone(&store),
            Arc::clone(&network),
            config.version.clone(),
            config.manifest_urls()?,
        );
        let reaper = GenerationReaper::new(Arc::clone(&store), config.version.clone());
        let policy = InterceptionPolicy::new(
            store,
            network,
            config.version.clone(),
            config.shell_url()?,
        );

        Ok(Self {
            config,
            precache,
            reaper,
            policy,
            notifications,
            windows,
            events: EventSink::default(),
        })
    }

    /// Report worker events on `events`.
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.policy = self.policy.with_events(events.clone());
        self.events = events;
        self
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub(crate) fn events(&self) -> &EventSink {
        &self.events
    }

    /// Install: precache the manifest.
    ///
    /// Precache failure is logged and reported as `None`; installation
    /// proceeds and the worker relies on network-fallback caching.
    pub async fn on_install(&self) -> Option<PrecacheReport> {
        info!(generation = %self.version(), "Installing");

        match self.precache.run().await {
            Ok(report) => {
                self.events.emit(WorkerEvent::PrecacheCompleted {
                    generation: report.generation.clone(),
                    entries: report.stored.len(),
                });
                Some(report)
            }
            Err(e) => {
                warn!(generation = %self.version(), error = %e, "Precache failed");
                self.events.emit(WorkerEvent::PrecacheFailed {
                    generation: self.version().to_string(),
                    error: e.to_string(),
                });
                None
            }
        }
    }

    /// Activate: reap every generation but the current one.
    pub async fn on_activate(&self) -> ReapReport {
        info!(generation = %self.version(), "Activating");

        match self.reaper.run().await {
            Ok(report) => {
                for generation in &report.deleted {
                    self.events.emit(WorkerEvent::GenerationDeleted {
                        generation: generation.clone(),
                    });
                }
                report
            }
            Err(e) => {
                warn!(error = %e, "Could not list cache generations, skipping reap");
                ReapReport::default()
            }
        }
    }

    /// Fetch: run the interception policy.
    pub async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome> {
        self.policy.handle(request).await
    }

    /// Push: show a notification built from the payload text.
    pub async fn on_push(&self, push: PushMessage) -> Result<NotificationId> {
        info!(has_payload = push.data.is_some(), "Push received");

        let options = NotificationOptions::from_push(&self.config.notifications, &push);
        let id = self
            .notifications
            .show_notification(&self.config.notifications.title, options)
            .await?;

        self.events
            .emit(WorkerEvent::NotificationShown { id: id.clone() });
        Ok(id)
    }

    /// Notification click: close it, then open the app for the open action.
    ///
    /// Returns whether a window was opened.
    pub async fn on_notification_click(&self, click: NotificationClick) -> Result<bool> {
        info!(action = ?click.action, "Notification clicked");

        if let Err(e) = self.notifications.close(&click.notification_id).await {
            warn!(error = %e, "Failed to close notification");
        }

        let notifications = &self.config.notifications;
        if click.action.as_deref() != Some(notifications.open_action.as_str()) {
            debug!(action = ?click.action, "No window action");
            return Ok(false);
        }

        let url = self.config.resolve(&notifications.open_path)?;
        self.windows.open_window(&url).await?;
        self.events.emit(WorkerEvent::WindowOpened { url });
        Ok(true)
    }
}
