// Route table for the Testsmith API
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::{handlers, metrics, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(handlers::submit_job).get(handlers::list_jobs))
        .route("/jobs/:id", get(handlers::get_job))
        .route("/jobs/:id/cancel", post(handlers::cancel_job))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(metrics::serve_metrics))
}
