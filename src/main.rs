use std::panic;
use std::sync::Arc;

use livesync_doc::config::Config;
use livesync_doc::store::FileStore;
use livesync_doc::{serve, spawn_background_tasks, AppState};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration before tracing so the log level can come from it
    let loaded = Config::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Initialize tracing; RUST_LOG wins over the configured level
    let default_filter = if config.is_development() {
        "livesync_doc=debug,tower_http=debug,axum::rejection=trace,info".to_string()
    } else {
        config.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();

    info!("Starting server ({})...", config.environment);
    match loaded {
        Ok(_) => info!("✅ Configuration loaded successfully"),
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            warn!("Using default configuration");
        }
    }

    // Open the document store
    let store = match FileStore::open(&config.files_dir).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open files directory: {}", e);
            std::process::exit(1);
        }
    };
    let watch_root = store.root().to_path_buf();

    let address = config.server_address();
    let app_state = AppState::new(config, Arc::new(store));
    let _tasks = spawn_background_tasks(&app_state, Some(watch_root));

    // Start the HTTP/WebSocket server
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", address));

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    serve(listener, app_state)
        .await
        .expect("Server failed to start");
}
