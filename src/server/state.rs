//! Application state shared across handlers.

use crate::catalog::BookCatalog;
use crate::config::{Config, validate_uploads_route};
use crate::db::Database;
use crate::error::Result;
use crate::uploads::{CoverNamer, TimestampNamer, UploadDir};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Book record service.
    pub catalog: BookCatalog,
}

impl AppState {
    /// Create state from already opened resources.
    pub fn new(config: Config, catalog: BookCatalog) -> Self {
        Self {
            config: Arc::new(config),
            catalog,
        }
    }

    /// Open the store and upload directory named by the config, with timestamp cover names.
    pub fn open(config: Config) -> Result<Self> {
        validate_uploads_route(&config.server.uploads_route)?;

        let db = Database::open(&config.database.path)?;
        let namer: Arc<dyn CoverNamer> = Arc::new(TimestampNamer::new());
        let uploads = UploadDir::new(&config.uploads.dir, namer)?;
        Ok(Self::new(config, BookCatalog::new(db, uploads)))
    }
}
