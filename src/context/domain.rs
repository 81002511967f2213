//! Shared application state.
//!
//! `AppContext` is the manual dependency-injection container every task
//! holds a clone of: the in-process bus, the shadow cache, configuration,
//! and (when storage is enabled) the persistence repository.

use std::sync::Arc;

use crate::bus::domain::EventBus;
use crate::config::Config;
use crate::persistence::repository::Repository;
use crate::shadow::domain::Shadow;

#[derive(Clone, Debug)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub bus: EventBus,
    pub shadow: Shadow,
    /// `None` when `storage.enabled` is `false`.
    pub repository: Option<Repository>,
}

impl AppContext {
    pub async fn new(config: Config) -> Self {
        let bus = EventBus::new();
        let shadow = Shadow::new();

        let repository = if config.storage.enabled {
            Some(Repository::create_repository(&config).await)
        } else {
            None
        };

        Self { config: Arc::new(config), bus, shadow, repository }
    }
}
