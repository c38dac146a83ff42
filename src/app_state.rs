use std::sync::Arc;

use crate::db::MissionStore;
use crate::services::queue::JobQueue;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MissionStore>,
    pub queue: Arc<JobQueue>,
}

impl AppState {
    pub fn new(store: Arc<dyn MissionStore>, queue: Arc<JobQueue>) -> Self {
        Self { store, queue }
    }
}
