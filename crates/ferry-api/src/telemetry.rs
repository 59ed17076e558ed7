//! Per-route request counting.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use ferry_telemetry::Metrics;

/// Route label for requests no handler matched.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Count the response under its route template, never the raw path.
pub(crate) async fn count_requests(
    State(metrics): State<Metrics>,
    matched: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let route = matched
        .as_ref()
        .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
        .to_owned();
    let response = next.run(request).await;
    metrics.inc_http_request(&route, response.status().as_u16());
    response
}
