//! Server state.

use dsversion_core::Versioning;
use std::sync::Arc;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    /// Versioning services over the host catalog.
    pub versioning: Arc<Versioning>,
}

impl AppState {
    pub fn new(versioning: Versioning) -> Self {
        Self {
            versioning: Arc::new(versioning),
        }
    }

    /// Base URL of the catalog site, without a trailing slash.
    pub fn site_url(&self) -> &str {
        self.versioning.config().site_url()
    }
}
