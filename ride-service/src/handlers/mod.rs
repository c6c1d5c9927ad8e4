//! HTTP handlers for ride-service.

pub mod bookings;
pub mod fares;
pub mod payments;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

use crate::services::{get_metrics, PaymentStore};
use crate::startup::AppState;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "ride-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness probe: the payment store must answer.
pub async fn readiness_check(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.payments.count().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        AppError::ServiceUnavailable(e.to_string())
    })?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "gateway_configured": state.orchestrator.gateway().is_configured()
        })),
    ))
}

/// Prometheus metrics endpoint.
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
