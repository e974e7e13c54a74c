use std::sync::Arc;

use chrono::TimeDelta;
use sqlx::PgPool;

use crate::config::Config;
use crate::google::GoogleAuth;
use crate::storage::FileStorage;

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub storage: Arc<FileStorage>,
    pub google: Arc<GoogleAuth>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        Self {
            pool,
            storage: Arc::new(FileStorage::from_config(&config.storage)),
            google: Arc::new(GoogleAuth::new(&config.auth)),
            config: Arc::new(config),
        }
    }

    pub fn session_ttl(&self) -> TimeDelta {
        TimeDelta::hours(self.config.auth.session_ttl_hours)
    }
}
