use std::sync::Arc;
use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use shared_config::AppConfig;
use visit_queue_cell::{
    InMemoryArchive, MaintenanceConfig, QueueAppState, QueueMaintenanceService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic visit queue server");

    let config = Arc::new(AppConfig::from_env());
    let state = Arc::new(QueueAppState::new(Arc::clone(&config)));

    // Archival to the persistent store is external; terminal entries are kept
    // in an in-process archive until an adapter is wired in.
    let maintenance = Arc::new(QueueMaintenanceService::new(
        state.registry.clone(),
        Arc::new(InMemoryArchive::new()),
        MaintenanceConfig::from_config(&config),
    ));
    let maintenance_task = Arc::clone(&maintenance);
    tokio::spawn(async move {
        if let Err(e) = maintenance_task.start().await {
            error!("Queue maintenance stopped: {}", e);
        }
    });

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let addr = config.bind_address();
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    maintenance.shutdown().await;
    info!("Server stopped");
    Ok(())
}
