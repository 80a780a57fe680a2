//! Application state.

use vpipe_queue::{QueueConfig, WorkQueue};
use vpipe_store::{connect, JobStore, StoreConfig};

use crate::config::ApiConfig;
use crate::dispatcher::Dispatcher;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: JobStore,
    pub dispatcher: Dispatcher,
}

impl AppState {
    /// Create new application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store_config = StoreConfig::from_env()?;
        let pool = connect(&store_config).await?;
        let store = JobStore::new(pool);

        let queue = WorkQueue::new(QueueConfig::from_env())?;
        let dispatcher = Dispatcher::new(queue);

        Ok(Self {
            config,
            store,
            dispatcher,
        })
    }
}
