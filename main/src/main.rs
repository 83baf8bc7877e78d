use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use async_openai::{config::OpenAIConfig, Client};
use axum::Router;
use common::{
    storage::{db::SurrealDbClient, vector::QdrantStore},
    utils::{
        config::{get_config, AppConfig},
        embedding::EmbeddingProvider,
    },
};
use retrieval_pipeline::{AnswerPipeline, OpenAiInference, PipelineSettings};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
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

    // Ensure db is initialized
    db.ensure_initialized().await?;

    let openai_client = Arc::new(Client::with_config(
        OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedding_provider =
        Arc::new(EmbeddingProvider::from_config(&config, Some(openai_client.clone())).await?);
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    let api_state = build_state(&config, db, openai_client, embedding_provider)?;
    let app = build_app(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_state(
    config: &AppConfig,
    db: Arc<SurrealDbClient>,
    openai_client: Arc<Client<OpenAIConfig>>,
    embedding_provider: Arc<EmbeddingProvider>,
) -> Result<ApiState, Box<dyn std::error::Error>> {
    let qdrant = Arc::new(QdrantStore::new(config, embedding_provider.clone())?);
    let inference = Arc::new(OpenAiInference::new(openai_client, config.chat_model.clone()));

    let pipeline = Arc::new(AnswerPipeline::new(
        qdrant.clone(),
        db.clone(),
        qdrant.clone(),
        inference,
        embedding_provider,
        PipelineSettings::from_config(config),
    ));

    Ok(ApiState::new(db, qdrant, pipeline))
}

fn build_app(api_state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes_v1())
        .with_state(api_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
