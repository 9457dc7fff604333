use std::sync::Arc;

use tracing::info;

use crate::{
    auth::{
        repo::{PgUserRepo, UserRepo},
        JwtKeys,
    },
    config::{AppConfig, StoreKind},
    db,
    memory::MemoryStore,
    todos::{PgTodoRepo, TodoRepo},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub users: Arc<dyn UserRepo>,
    pub todos: Arc<dyn TodoRepo>,
}

impl AppState {
    /// Connects the configured store. Postgres gets its migrations applied first.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        match config.store {
            StoreKind::Postgres => {
                let pool = db::connect(&config.database).await?;
                db::migrate(&pool).await?;
                info!(
                    host = %config.database.host,
                    database = %config.database.name,
                    "connected to postgres"
                );
                Ok(Self::from_parts(
                    config,
                    Arc::new(PgUserRepo::new(pool.clone())),
                    Arc::new(PgTodoRepo::new(pool)),
                ))
            }
            StoreKind::Memory => {
                info!("using in-memory store; data is lost on restart");
                Ok(Self::in_memory(config))
            }
        }
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserRepo>,
        todos: Arc<dyn TodoRepo>,
    ) -> Self {
        Self {
            keys: JwtKeys::new(&config.jwt),
            config: Arc::new(config),
            users,
            todos,
        }
    }

    pub fn in_memory(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::default());
        Self::from_parts(config, store.clone(), store)
    }
}
