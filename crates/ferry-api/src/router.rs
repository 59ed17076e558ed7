//! Router construction and server host.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::Request, middleware, routing::get};
use ferry_config::AppMode;
use ferry_links::DirectLinkRegistry;
use ferry_telemetry::{Metrics, build_sha};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Span, info};

use crate::error::{ApiServerError, ApiServerResult};
use crate::files::download;
use crate::health::{health, metrics as render_metrics};
use crate::state::ApiState;
use crate::telemetry::count_requests;

const HEADER_REQUEST_ID: &str = "x-request-id";

/// Axum router hosting the public file endpoint and diagnostics.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Wire handlers and middleware around the shared dependencies.
    #[must_use]
    pub fn new(registry: DirectLinkRegistry, metrics: Metrics, mode: AppMode) -> Self {
        let state = Arc::new(ApiState {
            registry,
            metrics: metrics.clone(),
            mode,
        });
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(HEADER_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    request_id = %request_id,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );
        let layered = ServiceBuilder::new()
            .layer(ferry_telemetry::set_request_id_layer())
            .layer(ferry_telemetry::propagate_request_id_layer())
            .layer(trace_layer)
            .layer(middleware::from_fn_with_state(metrics, count_requests));

        let router = Router::new()
            .route("/api/file/{file_id}", get(download))
            .route("/health", get(health))
            .route("/metrics", get(render_metrics))
            .route_layer(layered)
            .with_state(state);
        Self { router }
    }

    /// Router for in-process testing.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind `addr` and serve until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error when the listener cannot be bound or serving fails.
    pub async fn serve(self, addr: SocketAddr, shutdown: CancellationToken) -> ApiServerResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        info!(%addr, "api listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|source| ApiServerError::Serve { source })
    }
}
