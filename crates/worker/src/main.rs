use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deckhand_core::staging::LocalStager;
use deckhand_db::PgStore;
use deckhand_worker::config::WorkerConfig;
use deckhand_worker::controller::TaskController;
use deckhand_worker::renderer::HttpRenderer;
use deckhand_worker::router::build_worker_router;
use deckhand_worker::routes::WorkerState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "deckhand_worker=debug,deckhand_db=info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");
    tracing::info!(
        host = %config.host,
        port = config.port,
        staging_dir = %config.staging_dir,
        renderer_url = %config.renderer_url,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = deckhand_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    deckhand_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    deckhand_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Controller ---
    let renderer = HttpRenderer::new(
        &config.renderer_url,
        Duration::from_secs(config.render_timeout_secs),
    )
    .expect("Failed to build renderer client");
    let controller = TaskController::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(LocalStager::new(&config.staging_dir)),
        Arc::new(renderer),
    );

    let state = WorkerState::new(controller);
    let app = build_worker_router(state.clone());

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting worker");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Finish or abandon jobs accepted before the signal.
    state
        .drain(Duration::from_secs(config.shutdown_grace_secs))
        .await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
