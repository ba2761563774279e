//! Test doubles shared by the unit tests

use crate::client::RequestLayer;
use crate::config::ClientConfig;
use crate::connectivity::NetworkMonitor;
use crate::error::ApiError;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use caltracker_core::clock::ManualClock;
use caltracker_core::retry::RetryConfig;
use caltracker_core::storage::{KeyValueStore, MemoryStore};
use caltracker_core::{Error, Result as StoreResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) const BASE_URL: &str = "https://api.test/rest/v1";

/// Transport that replays queued outcomes and records every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, status: u16, body: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, body)));
    }

    pub(crate) fn fail(&self, message: &str) {
        self.script.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.requests.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ApiError::transport(message)),
            None => Err(ApiError::transport("connection refused")),
        }
    }
}

/// Store that fails reads, or a number of writes, on request.
#[derive(Default)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    failing_writes: AtomicUsize,
}

impl FlakyStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` writes; `usize::MAX` fails all of them
    pub(crate) fn fail_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn check_read(&self, key: &str) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::storage_read(key, "I/O error"));
        }
        Ok(())
    }

    fn check_write(&self, key: &str) -> StoreResult<()> {
        let consumed = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            });
        match consumed {
            Ok(_) => Err(Error::storage_write(key, "disk full")),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_read(key)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check_write(key)?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_write(key)?;
        self.inner.remove(key).await
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        self.check_read("*")?;
        self.inner.keys().await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.check_write("*")?;
        self.inner.clear().await
    }
}

/// Shared collaborators for one test
pub(crate) struct Harness {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) transport: Arc<ScriptedTransport>,
    pub(crate) network: NetworkMonitor,
    pub(crate) clock: ManualClock,
}

impl Harness {
    pub(crate) fn new(online: bool) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            transport: ScriptedTransport::new(),
            network: NetworkMonitor::new(online),
            clock: ManualClock::new(1_700_000_000_000),
        }
    }

    /// Config with the production defaults but no retry delay
    pub(crate) fn config() -> ClientConfig {
        ClientConfig::default()
            .with_base_url(BASE_URL)
            .with_retry(RetryConfig::fixed(3, Duration::ZERO))
    }

    pub(crate) fn layer(&self, service: &str) -> RequestLayer {
        self.layer_over(service, self.store.clone())
    }

    /// Layer whose cache and queue live in `store` instead of the harness store
    pub(crate) fn layer_over(&self, service: &str, store: Arc<dyn KeyValueStore>) -> RequestLayer {
        RequestLayer::new(
            service,
            &Self::config(),
            store,
            self.transport.clone(),
            Arc::new(self.network.clone()),
        )
        .unwrap()
        .with_clock(Arc::new(self.clock.clone()))
    }
}
