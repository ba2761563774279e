//! Sync coordinator
//!
//! Flushes every registered service's offline queue when connectivity comes
//! back or when asked to. At most one sync runs at a time; a trigger that
//! arrives while one is running is dropped.

use crate::client::RequestLayer;
use crate::connectivity::ConnectivityProbe;
use crate::queue::DrainReport;
use async_trait::async_trait;
use caltracker_core::clock::{Clock, SystemClock};
use caltracker_core::config::SyncConfig;
use caltracker_core::storage::KeyValueStore;
use caltracker_telemetry::{metrics, names};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Store key holding the last successful sync time (epoch milliseconds)
pub const LAST_SYNC_KEY: &str = "last_sync_timestamp";

/// A service whose offline state the coordinator maintains
#[async_trait]
pub trait OfflineSync: Send + Sync {
    /// Name used in reports and logs
    fn service_name(&self) -> &str;

    /// Replay queued mutations once
    async fn drain_offline_queue(&self) -> DrainReport;

    /// Remove expired cache entries
    async fn sweep_expired_cache(&self) -> usize;
}

#[async_trait]
impl OfflineSync for RequestLayer {
    fn service_name(&self) -> &str {
        RequestLayer::service_name(self)
    }

    async fn drain_offline_queue(&self) -> DrainReport {
        RequestLayer::drain_offline_queue(self).await
    }

    async fn sweep_expired_cache(&self) -> usize {
        RequestLayer::sweep_expired_cache(self).await
    }
}

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncState {
    /// Waiting for a trigger
    Idle,
    /// Draining queues
    Syncing,
}

/// Per-service results of one sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Drain results in registration order
    pub services: Vec<(String, DrainReport)>,
    /// When the sync finished (epoch milliseconds)
    pub finished_at: i64,
}

impl SyncReport {
    /// Counts summed over all services
    #[must_use]
    pub fn totals(&self) -> DrainReport {
        let mut total = DrainReport::default();
        for (_, report) in &self.services {
            total.merge(*report);
        }
        total
    }
}

/// Why a sync did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// No connectivity
    Offline,
    /// Another sync is in progress
    AlreadySyncing,
}

/// Result of a sync trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SyncOutcome {
    /// Every service was drained
    Completed(SyncReport),
    /// Nothing was drained
    Skipped(SkipReason),
}

impl SyncOutcome {
    /// Whether the sync ran
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Drains registered services' offline queues
pub struct SyncCoordinator {
    services: Vec<Arc<dyn OfflineSync>>,
    store: Arc<dyn KeyValueStore>,
    connectivity: Arc<dyn ConnectivityProbe>,
    clock: Arc<dyn Clock>,
    settings: SyncConfig,
    syncing: AtomicBool,
    started: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SyncCoordinator {
    /// Create a coordinator with no services
    pub fn new(store: Arc<dyn KeyValueStore>, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        Self {
            services: Vec::new(),
            store,
            connectivity,
            clock: Arc::new(SystemClock),
            settings: SyncConfig::default(),
            syncing: AtomicBool::new(false),
            started: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Register a service; services drain in registration order
    #[must_use]
    pub fn with_service(mut self, service: Arc<dyn OfflineSync>) -> Self {
        self.services.push(service);
        self
    }

    /// Use `clock` for sync timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Apply the `[sync]` settings
    #[must_use]
    pub fn with_settings(mut self, settings: SyncConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Registered service names in drain order
    #[must_use]
    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.service_name()).collect()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SyncState {
        if self.syncing.load(Ordering::SeqCst) {
            SyncState::Syncing
        } else {
            SyncState::Idle
        }
    }

    /// Listen for reconnects and run an initial sync if online
    ///
    /// Calling it again is a no-op. Must run inside a tokio runtime.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.settings.sweep_on_start {
            self.clear_expired_cache().await;
        }

        if self.settings.sync_on_reconnect {
            let changes = self.connectivity.subscribe();
            let was_connected = *changes.borrow();
            let handle = tokio::spawn(listen_for_reconnect(
                Arc::downgrade(self),
                changes,
                was_connected,
            ));
            if let Ok(mut slot) = self.listener.lock() {
                *slot = Some(handle);
            }
        }

        info!(services = ?self.service_names(), "Sync coordinator started");

        if self.connectivity.is_connected().await {
            self.sync_now().await;
        }
    }

    /// Stop listening for connectivity changes
    pub fn stop(&self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        self.started.store(false, Ordering::SeqCst);
    }

    /// Drain every service now unless offline or already syncing
    pub async fn sync_now(&self) -> SyncOutcome {
        if !self.connectivity.is_connected().await {
            debug!("Cannot sync: offline");
            metrics().increment(names::SYNC_SKIPPED);
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        self.run_sync().await
    }

    async fn run_sync(&self) -> SyncOutcome {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync already in progress");
            metrics().increment(names::SYNC_SKIPPED);
            return SyncOutcome::Skipped(SkipReason::AlreadySyncing);
        }

        info!("Processing offline data");
        let mut report = SyncReport::default();
        for service in &self.services {
            let drained = service.drain_offline_queue().await;
            report
                .services
                .push((service.service_name().to_string(), drained));
        }

        report.finished_at = self.clock.now_millis();
        if let Err(e) = self
            .store
            .set(LAST_SYNC_KEY, &report.finished_at.to_string())
            .await
        {
            warn!(error = %e, "Cannot record last sync time");
        }

        self.syncing.store(false, Ordering::SeqCst);
        metrics().increment(names::SYNC_RUNS);

        let totals = report.totals();
        info!(
            succeeded = totals.succeeded,
            failed = totals.failed,
            expired = totals.expired,
            "Offline data processed"
        );
        SyncOutcome::Completed(report)
    }

    /// Sweep every service's expired cache entries, returning the total removed
    pub async fn clear_expired_cache(&self) -> usize {
        let mut removed = 0;
        for service in &self.services {
            removed += service.sweep_expired_cache().await;
        }
        debug!(removed = removed, "Expired cache cleared");
        removed
    }

    /// Whether the device is online
    pub async fn is_online(&self) -> bool {
        self.connectivity.is_connected().await
    }

    /// Time of the last completed sync (epoch milliseconds)
    pub async fn last_sync_time(&self) -> Option<i64> {
        match self.store.get(LAST_SYNC_KEY).await {
            Ok(value) => value.and_then(|raw| raw.trim().parse().ok()),
            Err(e) => {
                warn!(error = %e, "Cannot read last sync time");
                None
            }
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `was_connected` is read when subscribing, not when the task first runs;
/// a change published in between is still pending on `changes`.
async fn listen_for_reconnect(
    coordinator: Weak<SyncCoordinator>,
    mut changes: tokio::sync::watch::Receiver<bool>,
    mut was_connected: bool,
) {
    while changes.changed().await.is_ok() {
        let connected = *changes.borrow_and_update();
        if connected && !was_connected {
            let Some(coordinator) = coordinator.upgrade() else {
                break;
            };
            info!("Connectivity restored, syncing");
            coordinator.run_sync().await;
        }
        was_connected = connected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestOptions;
    use crate::testing::Harness;
    use crate::transport::HttpMethod;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn coordinator(h: &Harness, layers: Vec<Arc<RequestLayer>>) -> Arc<SyncCoordinator> {
        let mut coordinator =
            SyncCoordinator::new(h.store.clone(), Arc::new(h.network.clone()))
                .with_clock(Arc::new(h.clock.clone()));
        for layer in layers {
            coordinator = coordinator.with_service(layer);
        }
        Arc::new(coordinator)
    }

    async fn queue_meal(layer: &RequestLayer) {
        layer
            .execute("/meals", HttpMethod::Post, Some(json!({"name": "Lunch"})), &RequestOptions::new())
            .await;
    }

    #[tokio::test]
    async fn test_sync_now_offline_is_skipped() {
        let h = Harness::new(false);
        let sync = coordinator(&h, vec![Arc::new(h.layer("nutrition"))]);

        assert_eq!(sync.sync_now().await, SyncOutcome::Skipped(SkipReason::Offline));
        assert_eq!(sync.last_sync_time().await, None);
    }

    #[tokio::test]
    async fn test_sync_drains_in_registration_order() {
        let h = Harness::new(false);
        let nutrition = Arc::new(h.layer("nutrition"));
        let food = Arc::new(h.layer("food"));
        queue_meal(&nutrition).await;
        food.execute("/foods", HttpMethod::Post, Some(json!({"name": "Egg"})), &RequestOptions::new())
            .await;

        h.network.set_connected(true);
        h.transport.respond(201, "{}");
        h.transport.respond(201, "{}");

        let sync = coordinator(&h, vec![nutrition.clone(), food.clone()]);
        let SyncOutcome::Completed(report) = sync.sync_now().await else {
            panic!("sync should run");
        };

        let names: Vec<_> = report.services.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["nutrition", "food"]);
        assert_eq!(report.totals().succeeded, 2);

        let urls: Vec<_> = h.transport.requests().into_iter().map(|r| r.url).collect();
        assert!(urls[0].ends_with("/meals"));
        assert!(urls[1].ends_with("/foods"));

        assert_eq!(sync.last_sync_time().await, Some(1_700_000_000_000));
        assert_eq!(sync.state(), SyncState::Idle);
    }

    struct BlockingService {
        entered: Notify,
        release: Notify,
        drains: AtomicUsize,
    }

    #[async_trait]
    impl OfflineSync for BlockingService {
        fn service_name(&self) -> &str {
            "blocking"
        }

        async fn drain_offline_queue(&self) -> DrainReport {
            self.drains.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            DrainReport::default()
        }

        async fn sweep_expired_cache(&self) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_dropped() {
        let h = Harness::new(true);
        let service = Arc::new(BlockingService {
            entered: Notify::new(),
            release: Notify::new(),
            drains: AtomicUsize::new(0),
        });
        let sync = Arc::new(
            SyncCoordinator::new(h.store.clone(), Arc::new(h.network.clone()))
                .with_service(service.clone()),
        );

        let first = tokio::spawn({
            let sync = sync.clone();
            async move { sync.sync_now().await }
        });
        service.entered.notified().await;
        assert_eq!(sync.state(), SyncState::Syncing);

        assert_eq!(
            sync.sync_now().await,
            SyncOutcome::Skipped(SkipReason::AlreadySyncing)
        );

        service.release.notify_one();
        assert!(first.await.unwrap().is_completed());
        assert_eq!(service.drains.load(Ordering::SeqCst), 1);
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn test_reconnect_triggers_sync() {
        let h = Harness::new(false);
        let nutrition = Arc::new(h.layer("nutrition"));
        queue_meal(&nutrition).await;

        let sync = coordinator(&h, vec![nutrition.clone()]);
        sync.start().await;
        assert_eq!(nutrition.queue().len().await.unwrap(), 1);

        h.transport.respond(201, "{}");
        h.network.set_connected(true);

        for _ in 0..100 {
            if nutrition.queue().is_empty().await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(nutrition.queue().is_empty().await.unwrap());
        assert!(sync.last_sync_time().await.is_some());
        sync.stop();
    }

    #[tokio::test]
    async fn test_every_reconnect_cycle_syncs() {
        let h = Harness::new(false);
        let nutrition = Arc::new(h.layer("nutrition"));
        let sync = coordinator(&h, vec![nutrition.clone()]);
        sync.start().await;

        for cycle in 0..2 {
            queue_meal(&nutrition).await;
            h.transport.respond(201, "{}");
            h.network.set_connected(true);

            for _ in 0..100 {
                if nutrition.queue().is_empty().await.unwrap() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(nutrition.queue().is_empty().await.unwrap(), "cycle {cycle}");

            h.network.set_connected(false);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(h.transport.calls(), 2);
        sync.stop();
    }

    #[tokio::test]
    async fn test_start_sweeps_expired_cache() {
        let h = Harness::new(false);
        let food = Arc::new(h.layer("food"));
        food.cache()
            .write("food_details_f1", &json!({}), Some(Duration::from_millis(10)))
            .await;
        h.clock.advance(Duration::from_secs(1));

        let sync = coordinator(&h, vec![food]);
        sync.start().await;
        sync.start().await;

        assert!(!h.store.exists("cache_food_details_f1").await.unwrap());
        sync.stop();
    }

    #[tokio::test]
    async fn test_clear_expired_cache_spans_services() {
        let h = Harness::new(true);
        let nutrition = Arc::new(h.layer("nutrition"));
        let food = Arc::new(h.layer("food"));
        nutrition
            .cache()
            .write("insights_u1", &json!([]), Some(Duration::from_millis(1)))
            .await;
        h.clock.advance(Duration::from_millis(5));

        let sync = coordinator(&h, vec![nutrition, food]);
        // Both layers share a store, so the first sweep takes the entry.
        assert_eq!(sync.clear_expired_cache().await, 1);
        assert_eq!(sync.clear_expired_cache().await, 0);
    }
}
