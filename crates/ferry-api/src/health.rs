//! Health and metrics endpoints.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::Response,
};
use ferry_telemetry::{MetricsSnapshot, build_sha};
use serde::Serialize;
use tracing::error;

use crate::problem::ApiError;
use crate::state::ApiState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) mode: &'static str,
    pub(crate) build: &'static str,
    pub(crate) metrics: MetricsSnapshot,
}

pub(crate) async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        mode: state.mode.as_str(),
        build: build_sha(),
        metrics: state.metrics.snapshot(),
    })
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    let body = state.metrics.render().map_err(|err| {
        error!(error = %err, "failed to render metrics");
        ApiError::internal("failed to render metrics")
    })?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .map_err(|err| {
            error!(error = %err, "failed to build metrics response");
            ApiError::internal("failed to build metrics response")
        })
}
