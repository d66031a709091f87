//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, GeminiAdapter, LocalBlobStore, MemoryDb, OpenAiCompletionAdapter},
    config::Config,
    error::ApiError,
    web::{notification_loop, router, state::AppState, ApiDoc},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use reminders_core::{
    Assistant, CompletionChain, CompletionService, DatabaseService, SystemClock,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let db: Arc<dyn DatabaseService> = if config.uses_memory_db() {
        warn!("DATABASE_URL is 'memory'; nothing will survive a restart.");
        Arc::new(MemoryDb::new())
    } else {
        info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await?;
        let db_adapter = DbAdapter::new(db_pool);
        info!("Running database migrations...");
        db_adapter.run_migrations().await?;
        info!("Database migrations complete.");
        Arc::new(db_adapter)
    };

    // --- 3. Initialize the AI Fallback Chain ---
    let mut providers: Vec<Arc<dyn CompletionService>> = Vec::new();
    if let Some(key) = &config.gemini_api_key {
        providers.push(Arc::new(GeminiAdapter::new(
            reqwest::Client::new(),
            key.clone(),
            config.gemini_model.clone(),
        )));
    }
    if let Some(key) = &config.openai_api_key {
        let openai_client = Client::with_config(OpenAIConfig::new().with_api_key(key));
        providers.push(Arc::new(OpenAiCompletionAdapter::new(
            openai_client,
            config.openai_model.clone(),
        )));
    }
    let chain = CompletionChain::new(providers, config.ai_timeout);
    if chain.is_empty() {
        warn!("No AI provider configured; assistant features will answer 502.");
    } else {
        info!("AI providers in order: {:?}", chain.provider_names());
    }
    let assistant = Assistant::new(Arc::new(chain));

    // --- 4. Build the Shared AppState ---
    let blobs = Arc::new(LocalBlobStore::new(
        config.avatar_dir.clone(),
        config.public_base_url.clone(),
    ));
    let app_state = Arc::new(AppState::new(
        db,
        config.clone(),
        assistant,
        blobs,
        Arc::new(SystemClock),
    ));

    // --- 5. Create the Web Router ---
    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state.clone()).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Notification Loop ---
    let token = CancellationToken::new();
    let notifications = tokio::spawn(notification_loop(app_state, token.clone()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    token.cancel();
    if let Err(e) = notifications.await {
        warn!("Notification loop ended abnormally: {}", e);
    }
    info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }
}
