//! API shared state

use std::sync::Arc;

use crate::registry::Registry;
use crate::storage::ConfigStore;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Store for runs, rolled-up buckets and associations
    pub store: Arc<dyn ConfigStore>,

    /// Registry used to merge aggregated results at query time
    pub registry: Arc<Registry>,
}

impl ApiState {
    pub fn new(store: Arc<dyn ConfigStore>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }
}
