use std::sync::Arc;

use topicshelf_core::{Config, RecordStore};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RecordStore>) -> Self {
        Self { config, store }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
