//! Shared application state.

use std::sync::Arc;

use outpost_db::Database;
use outpost_engine::ConfigCell;

use crate::workers::IntegrationSettings;

/// State shared by the HTTP handlers and the workers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,

    /// Latest integration settings, swapped by the reload loop.
    pub settings: Arc<ConfigCell<IntegrationSettings>>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        AppState {
            db,
            settings: Arc::new(ConfigCell::new(IntegrationSettings::default())),
        }
    }
}
