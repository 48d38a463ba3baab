pub mod app_state;
pub mod auth;
pub mod cache;
pub mod catalog;
pub mod error;
pub mod models;
pub mod queries;
pub mod storage;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

pub use app_state::{AppState, AppStore, DirectionHost};
pub use cache::QueryState;
pub use catalog::CatalogClient;
pub use error::{ApiError, AuthError, StorageError};
pub use models::{ApiResponse, Event, Language, PriceRange, SearchParams, User, Venue};
pub use queries::EventQueries;
pub use storage::Storage;

/// Construction knobs for [`App`]. Everything is optional; the defaults
/// match a production install.
#[derive(Default)]
pub struct AppConfig {
    /// Overrides the sqlite location (defaults to the platform data dir).
    pub database_path: Option<PathBuf>,
    /// Host hook that flips the UI layout direction on language change.
    pub direction_host: Option<Arc<dyn DirectionHost>>,
}

/// The whole data layer, explicitly constructed and handed to the
/// presentation layer at startup: read queries on one side, the app state
/// store on the other. No ambient singletons.
pub struct App {
    pub queries: EventQueries,
    pub store: AppStore,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let storage = match config.database_path {
            Some(path) => Storage::new(path),
            None => Storage::open_default(),
        };
        Self {
            queries: EventQueries::new(CatalogClient::new()),
            store: AppStore::new(storage, config.direction_host),
        }
    }

    /// Hydrates the state store. The host should show its loading screen
    /// until this returns; queries work before and after.
    pub async fn bootstrap(&self) {
        self.store.bootstrap().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn app_bootstraps_against_a_custom_database_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = App::new(AppConfig {
            database_path: Some(dir.path().join("app.sqlite")),
            direction_host: None,
        });
        assert!(app.store.snapshot().is_loading);
        app.bootstrap().await;
        assert!(!app.store.snapshot().is_loading);
    }
}
