//! Thin adapter binding [`OfflineWorker`] to a host's event model.
//!
//! The host guarantees install finishes before activate is dispatched, and
//! activate finishes before any fetch reaches the worker. Fetch, push and
//! click events run as independent tasks.

use std::sync::Arc;

use offline_common::{OfflineError, Result};
use offline_net::{Request, Url};
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, warn};

use crate::notification::{NotificationClick, NotificationId, PushMessage};
use crate::policy::FetchOutcome;
use crate::precache::PrecacheReport;
use crate::reaper::ReapReport;
use crate::worker::OfflineWorker;
use crate::{ServiceWorkerState, WorkerEvent};

/// Events delivered by the host.
#[derive(Debug)]
pub enum HostEvent {
    Install,
    Activate,
    Fetch {
        request: Request,
        /// URL of the page that issued the request.
        client_url: Option<Url>,
        reply: oneshot::Sender<Result<FetchOutcome>>,
    },
    Push(PushMessage),
    NotificationClick(NotificationClick),
}

/// Owns the worker's lifecycle state and dispatches host events to it.
pub struct WorkerHost {
    worker: Arc<OfflineWorker>,
    state: RwLock<ServiceWorkerState>,
}

impl WorkerHost {
    pub fn new(worker: OfflineWorker) -> Self {
        Self {
            worker: Arc::new(worker),
            state: RwLock::new(ServiceWorkerState::Parsed),
        }
    }

    pub fn worker(&self) -> &OfflineWorker {
        &self.worker
    }

    pub async fn state(&self) -> ServiceWorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: ServiceWorkerState) {
        *self.state.write().await = state;
        self.report_state(state);
    }

    /// Move from `from` to `to`, checking and setting under one write lock.
    async fn transition(&self, from: ServiceWorkerState, to: ServiceWorkerState) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != from {
                return Err(OfflineError::InvalidArgument(format!(
                    "cannot move to {to:?} from {:?}",
                    *state
                )));
            }
            *state = to;
        }
        self.report_state(to);
        Ok(())
    }

    fn report_state(&self, state: ServiceWorkerState) {
        self.worker.events().emit(WorkerEvent::StateChange {
            generation: self.worker.version().to_string(),
            new_state: state,
        });
    }

    /// Run the install transition; completes only after precaching settles.
    pub async fn install(&self) -> Result<Option<PrecacheReport>> {
        self.transition(ServiceWorkerState::Parsed, ServiceWorkerState::Installing)
            .await?;
        let report = self.worker.on_install().await;
        self.set_state(ServiceWorkerState::Installed).await;
        Ok(report)
    }

    /// Run the activate transition; fetches are only intercepted afterwards.
    pub async fn activate(&self) -> Result<ReapReport> {
        self.transition(ServiceWorkerState::Installed, ServiceWorkerState::Activating)
            .await?;
        let report = self.worker.on_activate().await;
        self.set_state(ServiceWorkerState::Activated).await;
        Ok(report)
    }

    /// Install then activate.
    pub async fn start(&self) -> Result<(Option<PrecacheReport>, ReapReport)> {
        let precache = self.install().await?;
        let reap = self.activate().await?;
        Ok((precache, reap))
    }

    /// Mark the worker as replaced; it stops intercepting.
    pub async fn retire(&self) {
        self.set_state(ServiceWorkerState::Redundant).await;
    }

    /// Route a fetch to the worker if it controls the issuing page.
    pub async fn fetch(&self, request: &Request, client_url: Option<&Url>) -> Result<FetchOutcome> {
        if !self.state().await.is_active() {
            debug!(url = %request.url, "Worker not active, passing through");
            return Ok(FetchOutcome::Passthrough);
        }

        if let Some(client) = client_url {
            if !self.worker.config().in_scope(client) {
                debug!(client = %client, "Client outside scope, passing through");
                return Ok(FetchOutcome::Passthrough);
            }
        }

        self.worker.on_fetch(request).await
    }

    pub async fn push(&self, push: PushMessage) -> Result<NotificationId> {
        self.worker.on_push(push).await
    }

    pub async fn notification_click(&self, click: NotificationClick) -> Result<bool> {
        self.worker.on_notification_click(click).await
    }

    /// Dispatch host events until the sender side closes.
    ///
    /// Lifecycle events are awaited in order; every other event runs as its
    /// own task.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<HostEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                HostEvent::Install => {
                    if let Err(e) = self.install().await {
                        warn!(error = %e, "Install event rejected");
                    }
                }
                HostEvent::Activate => {
                    if let Err(e) = self.activate().await {
                        warn!(error = %e, "Activate event rejected");
                    }
                }
                HostEvent::Fetch {
                    request,
                    client_url,
                    reply,
                } => {
                    let host = Arc::clone(&self);
                    tokio::spawn(async move {
                        let outcome = host.fetch(&request, client_url.as_ref()).await;
                        // The page may have gone away; the result is then moot.
                        let _ = reply.send(outcome);
                    });
                }
                HostEvent::Push(push) => {
                    let host = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = host.push(push).await {
                            warn!(error = %e, "Failed to show notification");
                        }
                    });
                }
                HostEvent::NotificationClick(click) => {
                    let host = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = host.notification_click(click).await {
                            warn!(error = %e, "Failed to handle notification click");
                        }
                    });
                }
            }
        }
        debug!("Host event channel closed");
    }
}
