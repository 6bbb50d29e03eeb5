// Prometheus counters for the submission surface.
use axum::http::StatusCode;
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    pub static ref JOBS_SUBMITTED: IntCounter = register_int_counter!(
        "testsmith_jobs_submitted_total",
        "Jobs accepted and queued for execution"
    )
    .expect("register testsmith_jobs_submitted_total");
    pub static ref JOBS_REJECTED: IntCounter = register_int_counter!(
        "testsmith_jobs_rejected_total",
        "Submissions rejected by queue admission control"
    )
    .expect("register testsmith_jobs_rejected_total");
}

/// GET /metrics - Prometheus text exposition
pub async fn serve_metrics() -> impl IntoResponse {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => (StatusCode::OK, buffer).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}
