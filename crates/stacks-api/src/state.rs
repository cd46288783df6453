//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and the
//! HTTP server. Services and the hub are generic over the repository traits;
//! AppState pins them to the SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use stacks_core::chat::service::ChatService;
use stacks_core::hub::ChatHub;
use stacks_infra::config::{load_config, resolve_data_dir};
use stacks_infra::sqlite::chat::SqliteChatRepository;
use stacks_infra::sqlite::identity::SqliteIdentityStore;
use stacks_infra::sqlite::pool::DatabasePool;
use stacks_types::config::StacksConfig;

/// Concrete type aliases for the generics pinned to infra implementations.
pub type ConcreteChatService = ChatService<SqliteChatRepository>;

pub type ConcreteHub = ChatHub<SqliteChatRepository>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub hub: Arc<ConcreteHub>,
    pub identity: Arc<SqliteIdentityStore>,
    pub config: Arc<StacksConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Connect to the database and wire services around `config`.
    ///
    /// Starts the hub's router task, so this must run inside the runtime.
    pub async fn init(data_dir: PathBuf, config: StacksConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir).await?;

        let db_pool = DatabasePool::open(&data_dir).await?;

        // The hub and the REST service share one repository.
        let chat_repo = Arc::new(SqliteChatRepository::new(db_pool.clone()));
        let chat_service = ChatService::new(chat_repo.clone());
        let hub = ChatHub::start(chat_repo, config.hub.clone());
        let identity = SqliteIdentityStore::new(db_pool.clone());

        Ok(Self {
            chat_service: Arc::new(chat_service),
            hub: Arc::new(hub),
            identity: Arc::new(identity),
            config: Arc::new(config),
            data_dir,
        })
    }
}

/// Resolve the data directory and load its `config.toml`.
pub async fn load_settings() -> (PathBuf, StacksConfig) {
    let data_dir = resolve_data_dir();
    let config = load_config(&data_dir).await;
    (data_dir, config)
}
