//! Service wiring
//!
//! Builds one request layer per feature service over shared collaborators
//! and a sync coordinator that drains them in a fixed order (nutrition, then
//! food).

use crate::client::RequestLayer;
use crate::config::ClientConfig;
use crate::connectivity::{ConnectivityProbe, NetworkMonitor};
use crate::endpoints::{FoodApi, NutritionApi, food, nutrition};
use crate::error::ClientResult;
use crate::sync::SyncCoordinator;
use crate::transport::{HttpTransport, Transport};
use caltracker_core::clock::{Clock, SystemClock};
use caltracker_core::config::SyncConfig;
use caltracker_core::storage::{FileStore, KeyValueStore};
use std::sync::Arc;
use tracing::info;

/// Feature services and their sync coordinator
pub struct Services {
    /// Meal logging and nutrition totals
    pub nutrition: NutritionApi,
    /// Food lookup
    pub food: FoodApi,
    /// Offline queue coordinator
    pub sync: Arc<SyncCoordinator>,
}

impl Services {
    /// Start wiring services for `config`
    #[must_use]
    pub fn builder(config: ClientConfig) -> ServicesBuilder {
        ServicesBuilder {
            config,
            store: None,
            transport: None,
            connectivity: None,
            clock: None,
            sync_settings: SyncConfig::default(),
        }
    }
}

/// Builder for [`Services`]
///
/// Unset collaborators default to a [`FileStore`] in the platform data
/// directory, an [`HttpTransport`], an online [`NetworkMonitor`], and the
/// system clock.
#[must_use]
pub struct ServicesBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    connectivity: Option<Arc<dyn ConnectivityProbe>>,
    clock: Option<Arc<dyn Clock>>,
    sync_settings: SyncConfig,
}

impl ServicesBuilder {
    /// Persistent store for caches, queues, and the sync timestamp
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Network transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Connectivity source
    pub fn connectivity(mut self, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Clock for expiry and sync timestamps
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// `[sync]` settings for the coordinator
    pub fn sync_settings(mut self, settings: SyncConfig) -> Self {
        self.sync_settings = settings;
        self
    }

    /// Create the layers and the coordinator
    pub async fn build(self) -> ClientResult<Services> {
        self.config.validate()?;

        let store: Arc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::open_default().await?),
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };
        let connectivity: Arc<dyn ConnectivityProbe> = match self.connectivity {
            Some(connectivity) => connectivity,
            None => Arc::new(NetworkMonitor::online()),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let layer = |service: &str| -> ClientResult<Arc<RequestLayer>> {
            Ok(Arc::new(
                RequestLayer::new(
                    service,
                    &self.config,
                    store.clone(),
                    transport.clone(),
                    connectivity.clone(),
                )?
                .with_clock(clock.clone()),
            ))
        };
        let nutrition_layer = layer(nutrition::SERVICE_NAME)?;
        let food_layer = layer(food::SERVICE_NAME)?;

        let sync = SyncCoordinator::new(store.clone(), connectivity.clone())
            .with_clock(clock.clone())
            .with_settings(self.sync_settings)
            .with_service(nutrition_layer.clone())
            .with_service(food_layer.clone());

        info!(
            base_url = %self.config.base_url,
            environment = ?self.config.environment,
            "Services initialized"
        );

        Ok(Services {
            nutrition: NutritionApi::new(nutrition_layer),
            food: FoodApi::new(food_layer),
            sync: Arc::new(sync),
        })
    }
}
