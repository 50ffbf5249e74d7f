use std::sync::Arc;

use birthcal_core::FeedCache;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    // Written by the sync worker, read on every request
    pub cache: Arc<FeedCache>,
}

impl AppState {
    pub fn new(cache: Arc<FeedCache>) -> Self {
        AppState { cache }
    }
}
