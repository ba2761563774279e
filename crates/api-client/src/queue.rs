//! Durable queue of mutations issued while offline
//!
//! Each service owns one queue, persisted as a JSON array under
//! `offline_queue_<service>`. Insertion order is replay order. A drain makes
//! one pass: expired entries are dropped, the rest are replayed once, and
//! only the failures are written back for the next pass.
//!
//! Read-modify-write cycles hold an async mutex, so an enqueue that arrives
//! during a drain lands after the drain has persisted its result.

use crate::transport::HttpMethod;
use caltracker_core::clock::{Clock, duration_millis};
use caltracker_core::storage::KeyValueStore;
use caltracker_core::{Error, Result};
use caltracker_telemetry::{metrics, names};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Store key prefix for offline queues
pub const QUEUE_PREFIX: &str = "offline_queue_";

/// A mutation waiting for connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// Path relative to the base URL
    pub url: String,
    /// HTTP method
    pub method: HttpMethod,
    /// JSON body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Enqueue time in epoch milliseconds
    pub timestamp: i64,
    /// Epoch milliseconds after which the entry is dropped; `None` never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

impl QueuedRequest {
    /// Build an entry enqueued at `now`
    pub fn new(
        url: impl Into<String>,
        method: HttpMethod,
        data: Option<Value>,
        now: i64,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            url: url.into(),
            method,
            data,
            timestamp: now,
            expiry: ttl.map(|ttl| now.saturating_add(duration_millis(ttl))),
        }
    }

    /// Whether the entry is stale at `now`
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry.is_some_and(|expiry| now > expiry)
    }
}

/// Counts from one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Replayed successfully and removed
    pub succeeded: usize,
    /// Replayed unsuccessfully and kept
    pub failed: usize,
    /// Dropped without replay
    pub expired: usize,
}

impl DrainReport {
    /// Entries the pass looked at
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.expired
    }

    /// Whether the pass found nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Add another report's counts
    pub fn merge(&mut self, other: DrainReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.expired += other.expired;
    }
}

/// Persistent FIFO of one service's offline mutations
pub struct OfflineQueue {
    service: String,
    key: String,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl OfflineQueue {
    /// Create the queue for `service`
    pub fn new(
        service: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let service = service.into();
        Self {
            key: format!("{QUEUE_PREFIX}{service}"),
            service,
            store,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Store key holding this queue
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append an entry and persist immediately, returning the new length
    pub async fn enqueue(&self, request: QueuedRequest) -> Result<usize> {
        let _guard = self.lock.lock().await;

        let mut entries = self.load().await?;
        debug!(
            service = %self.service,
            method = %request.method,
            url = %request.url,
            "Queueing offline request"
        );
        entries.push(request);
        self.persist(&entries).await?;

        metrics().increment(names::QUEUE_ENQUEUED);
        info!(service = %self.service, depth = entries.len(), "Request queued for later");
        Ok(entries.len())
    }

    /// Entries in replay order
    pub async fn entries(&self) -> Result<Vec<QueuedRequest>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Number of queued entries
    pub async fn len(&self) -> Result<usize> {
        Ok(self.entries().await?.len())
    }

    /// Whether nothing is queued
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Drop every entry
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.persist(&[]).await
    }

    /// Replay the queue once in insertion order
    ///
    /// `replay` returns whether the entry succeeded. Failures are kept for the
    /// next drain and are not retried within this pass.
    pub async fn drain<F, Fut>(&self, mut replay: F) -> DrainReport
    where
        F: FnMut(QueuedRequest) -> Fut,
        Fut: Future<Output = bool>,
    {
        let _guard = self.lock.lock().await;
        let mut report = DrainReport::default();

        let entries = match self.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(service = %self.service, error = %e, "Cannot read offline queue");
                return report;
            }
        };
        if entries.is_empty() {
            return report;
        }

        let now = self.clock.now_millis();
        let mut retained = Vec::new();

        for entry in entries {
            if entry.is_expired(now) {
                debug!(service = %self.service, url = %entry.url, "Dropping expired queued request");
                report.expired += 1;
                continue;
            }

            debug!(
                service = %self.service,
                method = %entry.method,
                url = %entry.url,
                "Replaying queued request"
            );
            if replay(entry.clone()).await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
                retained.push(entry);
            }
        }

        if let Err(e) = self.persist(&retained).await {
            warn!(service = %self.service, error = %e, "Cannot persist offline queue, retrying");
            if let Err(e) = self.persist(&retained).await {
                warn!(
                    service = %self.service,
                    succeeded = report.succeeded,
                    error = %e,
                    "Replayed requests are still stored and will be sent again on the next drain"
                );
            }
        }

        metrics().increment_by(names::QUEUE_REPLAYED, report.succeeded as u64);
        metrics().increment_by(names::QUEUE_EXPIRED, report.expired as u64);
        info!(
            service = %self.service,
            succeeded = report.succeeded,
            failed = report.failed,
            expired = report.expired,
            "Offline queue processed"
        );
        report
    }

    async fn load(&self) -> Result<Vec<QueuedRequest>> {
        match self.store.get(&self.key).await? {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).or_else(|e| {
                let error = Error::storage_corrupted(&self.key).with_source(e);
                warn!(service = %self.service, error = %error, "Discarding unreadable offline queue");
                Ok(Vec::new())
            }),
        }
    }

    async fn persist(&self, entries: &[QueuedRequest]) -> Result<()> {
        if entries.is_empty() {
            self.store.remove(&self.key).await?;
        } else {
            let raw = serde_json::to_string(entries)
                .map_err(|e| Error::storage_write(&self.key, e))?;
            self.store.set(&self.key, &raw).await?;
        }
        metrics().gauge(&names::queue_depth(&self.service), entries.len() as u64);
        Ok(())
    }
}
