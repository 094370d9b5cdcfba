use std::sync::Arc;

use common::{storage::db::SurrealDbClient, utils::config::AppConfig};
use orchestrator::EngineLifecycleManager;
use query_service::QueryService;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub manager: Arc<EngineLifecycleManager>,
    pub query: Arc<QueryService>,
}

impl ApiState {
    pub fn new(
        config: AppConfig,
        db: Arc<SurrealDbClient>,
        manager: Arc<EngineLifecycleManager>,
        query: Arc<QueryService>,
    ) -> Self {
        Self {
            db,
            config,
            manager,
            query,
        }
    }
}
