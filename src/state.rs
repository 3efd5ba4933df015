use std::sync::Arc;

use crate::config::Config;
use crate::directory::{Directory, NewDriver};
use crate::engine::chat::ChatThreadCoordinator;
use crate::engine::lifecycle::OrderLifecycleManager;
use crate::engine::location::LocationFeed;
use crate::engine::negotiation::DispatchNegotiationEngine;
use crate::engine::pricing::PricingConfig;
use crate::error::AppError;
use crate::fanout::EventFanout;
use crate::models::directory::Driver;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: Config,
    pub directory: Arc<Directory>,
    pub fanout: Arc<EventFanout>,
    pub chat: Arc<ChatThreadCoordinator>,
    pub location: Arc<LocationFeed>,
    pub lifecycle: Arc<OrderLifecycleManager>,
    pub negotiation: Arc<DispatchNegotiationEngine>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let metrics = Metrics::new();
        let directory = Arc::new(Directory::new());
        let fanout = Arc::new(EventFanout::new(config.event_buffer_size, metrics.clone()));
        let chat = Arc::new(ChatThreadCoordinator::new(fanout.clone(), metrics.clone()));
        let location = Arc::new(LocationFeed::new(
            fanout.clone(),
            metrics.clone(),
            config.location_freshness_secs,
            config.location_history_limit,
        ));
        let lifecycle = Arc::new(OrderLifecycleManager::new(
            directory.clone(),
            chat.clone(),
            location.clone(),
            fanout.clone(),
            metrics.clone(),
            PricingConfig::from(&config),
        ));
        let negotiation = Arc::new(DispatchNegotiationEngine::new(
            lifecycle.clone(),
            directory.clone(),
            fanout.clone(),
            metrics.clone(),
            config.offer_ttl_secs,
        ));

        Self {
            config,
            directory,
            fanout,
            chat,
            location,
            lifecycle,
            negotiation,
            metrics,
        }
    }

    /// Registers a driver and seeds their fallback map position.
    pub fn register_driver(&self, payload: NewDriver) -> Result<Driver, AppError> {
        let driver = self.directory.add_driver(payload)?;
        self.location.set_base(driver.id, driver.base_location);
        Ok(driver)
    }
}
