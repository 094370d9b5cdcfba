use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    storage::db::SurrealDbClient,
    utils::{config::get_config, embedding::EmbeddingProvider},
};
use indexing_pipeline::{IndexingPipeline, ObjectStoreContent};
use orchestrator::{EngineLifecycleManager, ExpiryScheduler};
use query_service::QueryService;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedding_provider = Arc::new(EmbeddingProvider::from_config(
        &config,
        Arc::clone(&openai_client),
    ));
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    // Index definitions follow the provider's dimension, so a backend
    // change takes effect at startup.
    db.ensure_indexes(embedding_provider.dimension()).await?;

    let content = Arc::new(ObjectStoreContent::local(&config.data_dir)?);
    let pipeline = Arc::new(IndexingPipeline::new(
        Arc::clone(&db),
        Arc::clone(&embedding_provider),
        content,
        config.chunk_size,
        config.chunk_overlap,
    )?);

    let manager = Arc::new(EngineLifecycleManager::from_config(
        &config,
        Arc::clone(&db),
        pipeline,
    ));
    let query = Arc::new(QueryService::from_config(
        &config,
        Arc::clone(&db),
        Arc::clone(&manager),
        embedding_provider,
        openai_client,
    ));

    // Background TTL enforcement for the life of the process.
    let scheduler = ExpiryScheduler::from_config(&config, Arc::clone(&manager));
    tokio::spawn(scheduler.run());

    let api_state = ApiState::new(config.clone(), db, manager, query);
    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::{body::Body, http::Request, http::StatusCode};
    use common::utils::config::AppConfig;
    use indexing_pipeline::StaticContent;
    use query_service::AnswerGenerator;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn smoke_startup_with_in_memory_surrealdb() {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let config = AppConfig {
            api_key: "smoke-key".into(),
            ..AppConfig::default()
        };

        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );

        // Hashed embeddings avoid any external dependency in the smoke test.
        let embedding_provider = Arc::new(EmbeddingProvider::new_hashed(64));
        db.ensure_indexes(embedding_provider.dimension())
            .await
            .expect("indexes");

        let pipeline = Arc::new(
            IndexingPipeline::new(
                Arc::clone(&db),
                Arc::clone(&embedding_provider),
                Arc::new(StaticContent::new()),
                config.chunk_size,
                config.chunk_overlap,
            )
            .expect("pipeline"),
        );
        let manager = Arc::new(EngineLifecycleManager::from_config(
            &config,
            Arc::clone(&db),
            pipeline,
        ));
        let query = Arc::new(QueryService::new(
            Arc::clone(&db),
            Arc::clone(&manager),
            embedding_provider,
            AnswerGenerator::Extractive,
            config.retrieval_top_k,
            config.confidence_floor,
        ));

        let scheduler = ExpiryScheduler::new(Arc::clone(&manager), Duration::from_secs(300));
        let scheduler_handle = tokio::spawn(scheduler.run());

        let api_state = ApiState::new(config, db, manager, query);
        let app = Router::new()
            .nest("/api/v1", api_routes_v1(&api_state))
            .with_state(api_state);

        let live = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(live.status(), StatusCode::OK);

        let unauthorized = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/claims/CLM-1/readiness")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

        scheduler_handle.abort();
    }
}
