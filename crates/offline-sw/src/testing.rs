//! Scripted collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::StatusCode;
use offline_common::{OfflineError, Result};
use offline_net::{cache_key, NetError, Network, Request, Response, ResponseType, Url};
use tokio::sync::Notify;

use crate::cache::{CacheEntry, CacheStore, MemoryCacheStorage};
use crate::notification::{ClientWindows, NotificationId, NotificationOptions, NotificationSink};

pub const ORIGIN: &str = "https://mon.example.com/";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Network with canned per-URL responses and an offline switch.
#[derive(Default)]
pub struct FakeNetwork {
    routes: Mutex<HashMap<String, (StatusCode, ResponseType, &'static str)>>,
    offline: AtomicBool,
    fetches: AtomicUsize,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, path: &str, body: &'static str) -> Self {
        self.route_with(path, StatusCode::OK, ResponseType::Basic, body)
    }

    pub fn route_with(
        self,
        path: &str,
        status: StatusCode,
        response_type: ResponseType,
        body: &'static str,
    ) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(cache_key(&url(path)), (status, response_type, body));
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, NetError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline(request.url.to_string()));
        }
        let routes = self.routes.lock().unwrap();
        Ok(match routes.get(&request.cache_key()) {
            Some((status, response_type, body)) => Response::new(request.url.clone(), *status)
                .with_type(*response_type)
                .with_body(*body),
            None => Response::new(request.url.clone(), StatusCode::NOT_FOUND),
        })
    }
}

/// Memory store that counts accesses and can be told to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryCacheStorage,
    fail_deletes: Mutex<HashSet<String>>,
    /// Puts still allowed before every further put fails; `None` is unlimited.
    put_budget: Mutex<Option<usize>>,
    put_gate: Mutex<Option<Arc<Notify>>>,
    fail_reads: AtomicBool,
    pub accesses: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_delete_of(&self, name: &str) {
        self.fail_deletes.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_puts(&self) {
        self.fail_puts_after(0);
    }

    pub fn fail_puts_after(&self, allowed: usize) {
        *self.put_budget.lock().unwrap() = Some(allowed);
    }

    /// Make every put wait until the returned gate is notified.
    pub fn gate_puts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.put_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn take_put_budget(&self) -> bool {
        let mut budget = self.put_budget.lock().unwrap();
        match *budget {
            Some(0) => false,
            Some(ref mut left) => {
                *left -= 1;
                true
            }
            None => true,
        }
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn accesses(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.accesses.fetch_add(1, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(OfflineError::cache("read refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn open(&self, name: &str) -> Result<()> {
        self.touch();
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.touch();
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.touch();
        if self.fail_deletes.lock().unwrap().contains(name) {
            return Err(OfflineError::cache(format!("delete of {name} refused")));
        }
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.touch();
        self.check_read()?;
        self.inner.keys().await
    }

    async fn put(&self, name: &str, key: &str, entry: CacheEntry) -> Result<()> {
        self.touch();
        let gate = self.put_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if !self.take_put_budget() {
            return Err(OfflineError::cache("quota exceeded"));
        }
        self.inner.put(name, key, entry).await
    }

    async fn match_in(&self, name: &str, key: &str) -> Result<Option<CacheEntry>> {
        self.touch();
        self.check_read()?;
        self.inner.match_in(name, key).await
    }

    async fn match_request(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.touch();
        self.check_read()?;
        self.inner.match_request(key).await
    }

    async fn cache_keys(&self, name: &str) -> Result<Vec<String>> {
        self.touch();
        self.inner.cache_keys(name).await
    }
}

/// Records shown and closed notifications.
#[derive(Default)]
pub struct RecordingNotifications {
    pub shown: Mutex<Vec<(String, NotificationOptions)>>,
    pub closed: Mutex<Vec<NotificationId>>,
    /// Refuse to show or close anything.
    pub denied: AtomicBool,
}

impl RecordingNotifications {
    pub fn denied() -> Self {
        Self {
            denied: AtomicBool::new(true),
            ..Self::default()
        }
    }

    fn check_permission(&self) -> Result<()> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(OfflineError::Notification("permission denied".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifications {
    async fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Result<NotificationId> {
        self.check_permission()?;
        let mut shown = self.shown.lock().unwrap();
        shown.push((title.to_string(), options));
        Ok(NotificationId(format!("n{}", shown.len())))
    }

    async fn close(&self, id: &NotificationId) -> Result<()> {
        self.check_permission()?;
        self.closed.lock().unwrap().push(id.clone());
        Ok(())
    }
}

/// Records opened windows.
#[derive(Default)]
pub struct RecordingWindows {
    pub opened: Mutex<Vec<Url>>,
    /// Fail every open, as a host with no client to focus would.
    pub unavailable: AtomicBool,
}

#[async_trait]
impl ClientWindows for RecordingWindows {
    async fn open_window(&self, url: &Url) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OfflineError::Client(format!("cannot open {url}")));
        }
        self.opened.lock().unwrap().push(url.clone());
        Ok(())
    }
}
