mod handlers;
mod metrics;
mod routes;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use testsmith_common::config;
use testsmith_common::queue::{JobQueue, RedisQueue};
use testsmith_common::store::{JobStore, RedisStore};

pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
    /// Admission control: submissions are rejected past this backlog.
    pub max_queue_depth: usize,
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Testsmith API booting...");

    let redis_url = config::redis_url();
    let conn = config::connect(&redis_url)
        .await
        .expect("Failed to connect to Redis");
    info!("Connected to Redis: {}", redis_url);

    let state = Arc::new(AppState {
        store: Arc::new(RedisStore::new(conn.clone())),
        queue: Arc::new(RedisQueue::new(conn)),
        max_queue_depth: config::env_usize("MAX_QUEUE_DEPTH", 64),
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept jobs");

    axum::serve(listener, app).await.expect("Server error");
}
