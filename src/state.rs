use std::sync::Arc;

use crate::auth::repo::{MemoryUserStore, PgUserStore, UserStore};
use crate::auth::services::AuthService;
use crate::config::AppConfig;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let pool = crate::db::connect(&config.database_url).await?;
        crate::db::prepare(&pool, config.reset_schema).await?;
        let store = Arc::new(PgUserStore::new(pool)) as Arc<dyn UserStore>;
        Ok(Self::from_parts(store, config))
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: Arc<AppConfig>) -> Self {
        Self {
            auth: AuthService::new(store),
            config,
        }
    }

    /// State backed by the in-memory store; used by the router tests.
    pub fn fake() -> Self {
        Self::from_parts(Arc::new(MemoryUserStore::new()), Arc::new(AppConfig::fake()))
    }
}
