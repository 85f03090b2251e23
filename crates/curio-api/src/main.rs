//! curio-api - HTTP API server for curio

mod error;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use curio_core::{ChatBackend, Encoder};
use curio_db::Database;
use curio_inference::{ChatClient, EncoderClient};
use curio_jobs::{
    EmbedItemHandler, EnrichItemHandler, HttpContentFetcher, JobWorker, WorkerConfig,
};

use handlers::{chat, items, map, search, sessions, system, workspaces};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/curio".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(curio_core::defaults::SERVER_PORT);

    info!("Connecting to database...");
    let db = Database::connect(&database_url).await?;
    db.migrate().await?;
    info!("Database connected, migrations applied");

    let encoder: Arc<dyn Encoder> = Arc::new(EncoderClient::from_env());
    let chat_backend: Arc<dyn ChatBackend> = Arc::new(ChatClient::from_env()?);

    let state = AppState::new(db.clone(), encoder.clone(), chat_backend);

    // Background indexing worker: enrichment first, then embedding.
    let worker_config = WorkerConfig::from_env();
    let worker_handle = if worker_config.enabled {
        let worker = JobWorker::new(db, worker_config);
        worker
            .register_handler(EnrichItemHandler::new(
                state.items.clone(),
                state.jobs.clone(),
                Arc::new(HttpContentFetcher::new()),
            ))
            .await;
        worker
            .register_handler(EmbedItemHandler::new(state.items.clone(), encoder))
            .await;
        let handle = worker.start();
        info!("Job worker started");
        Some(handle)
    } else {
        info!("Job worker disabled");
        None
    };

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!(%addr, "curio API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = worker_handle {
        info!("Shutting down job worker...");
        let _ = handle.shutdown().await;
    }
    info!("Shutdown complete");
    Ok(())
}

/// Build the API router with shared state and HTTP layers.
fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/health", get(system::health_check))
        // Workspaces
        .route(
            "/api/v1/workspaces",
            get(workspaces::list_workspaces).post(workspaces::create_workspace),
        )
        .route(
            "/api/v1/workspaces/:id",
            axum::routing::delete(workspaces::delete_workspace),
        )
        // Items
        .route(
            "/api/v1/workspaces/:id/items",
            get(items::list_items).post(items::create_item),
        )
        .route(
            "/api/v1/items/:id",
            get(items::get_item)
                .patch(items::update_item)
                .delete(items::delete_item),
        )
        // Search and map
        .route("/api/v1/workspaces/:id/search", get(search::search_workspace))
        .route("/api/v1/workspaces/:id/map", get(map::workspace_map))
        // Sessions and chat
        .route(
            "/api/v1/workspaces/:id/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/v1/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/api/v1/sessions/:id/chat", axum::routing::post(chat::chat_turn))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Initialize tracing from the environment.
///
/// | Variable | Default |
/// |----------|---------|
/// | `RUST_LOG` | `curio_api=debug,tower_http=debug` |
/// | `LOG_FORMAT` | `text` (`json` for structured output) |
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "curio_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolve on SIGINT/SIGTERM so in-flight requests drain before exit.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}
