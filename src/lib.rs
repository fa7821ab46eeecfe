//! Live document sync: a server that keeps one authoritative, durable copy of
//! each document and fans changes out to every editor, and a client that
//! debounces edits, tracks acknowledgements and survives disconnects without
//! losing unsaved work.

pub mod client;
pub mod config;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod store;
pub mod websocket;
pub mod ws;

use std::path::PathBuf;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{http::HeaderValue, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::docs::ApiDoc;
use crate::routes::create_api_routes;
use crate::store::watcher::spawn_poll_watcher;
use crate::store::DocumentStore;
use crate::websocket::{websocket_document_handler, websocket_handler};
use crate::ws::external::spawn_external_change_listener;
use crate::ws::SessionRegistry;

pub use crate::error::SyncError;

/// Shared server state
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    /// Live WebSocket connections
    pub connections: AtomicU32,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new(store, config.broadcast_capacity));
        Arc::new(Self {
            config: Arc::new(config),
            registry,
            connections: AtomicU32::new(0),
            started_at: Instant::now(),
        })
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match config.cors_origin_list() {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match o.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin '{}'", o);
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(origins))
        }
        None => layer.allow_origin(Any),
    }
}

/// Build the full HTTP + WebSocket router.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let api_routes = create_api_routes(app_state.clone());

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/ws/*document_id", get(websocket_document_handler))
        .with_state(app_state.clone())
        // Mount API routes
        .nest("/api", api_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(&app_state.config))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}

/// Start the external-change listener, the files watcher (when `watch_root`
/// is given and polling is enabled) and the idle session reaper.
pub fn spawn_background_tasks(app_state: &Arc<AppState>, watch_root: Option<PathBuf>) -> Vec<JoinHandle<()>> {
    let config = &app_state.config;
    let mut tasks = Vec::new();

    let (change_tx, change_rx) = mpsc::channel(256);
    tasks.push(spawn_external_change_listener(
        app_state.registry.clone(),
        change_rx,
        config.external_debounce(),
    ));

    match (watch_root, config.watch_interval()) {
        (Some(root), Some(interval)) => tasks.push(spawn_poll_watcher(root, interval, change_tx)),
        _ => info!("Files watcher disabled"),
    }

    let registry = app_state.registry.clone();
    let max_idle = config.session_idle();
    tasks.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval((max_idle / 2).max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            registry.reap_idle(max_idle).await;
        }
    }));

    tasks
}

/// Serve on an already bound listener until the server fails.
pub async fn serve(listener: TcpListener, app_state: Arc<AppState>) -> std::io::Result<()> {
    axum::serve(listener, build_router(app_state)).await
}
