use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use ferry_api::ApiServer;
use ferry_config::AppMode;
use ferry_core::DirectLinkRecord;
use ferry_links::{DirectLinkRegistry, StaticIpResolver};
use ferry_store::{MemoryStore, TransferStore};
use ferry_telemetry::Metrics;
use tower::ServiceExt;

const BODY_LIMIT: usize = 1 << 20;

fn server(store: &TransferStore, metrics: &Metrics) -> ApiServer {
    let registry = DirectLinkRegistry::new(
        store.clone(),
        Arc::new(StaticIpResolver(IpAddr::V4(Ipv4Addr::LOCALHOST))),
        "files.ferry.example",
    );
    ApiServer::new(registry, metrics.clone(), AppMode::Api)
}

fn get(uri: &str) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

#[tokio::test]
async fn registered_files_stream_with_their_display_name() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let path = temp.path().join("clip.mp4");
    tokio::fs::write(&path, b"frames").await?;
    let store = TransferStore::new(Arc::new(MemoryStore::new()));
    store
        .put_direct_link(
            "f00d",
            &DirectLinkRecord {
                name: "holiday clip.mp4".into(),
                mime_type: "video/mp4".into(),
                size: 6,
                file_path: path,
                host: "files.ferry.example".into(),
            },
        )
        .await?;
    let metrics = Metrics::new()?;

    let response = server(&store, &metrics)
        .router()
        .oneshot(get("/api/file/f00d")?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "6");
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str()?;
    assert!(disposition.starts_with("attachment; filename=\"holiday clip.mp4\""));
    assert!(response.headers().contains_key("x-request-id"));
    let body = to_bytes(response.into_body(), BODY_LIMIT).await?;
    assert_eq!(&body[..], b"frames");

    assert!(
        metrics
            .render()?
            .contains("http_requests_total{code=\"200\",route=\"/api/file/{file_id}\"} 1")
    );
    Ok(())
}

#[tokio::test]
async fn unknown_and_vanished_files_are_not_found() -> anyhow::Result<()> {
    let store = TransferStore::new(Arc::new(MemoryStore::new()));
    store
        .put_direct_link(
            "gone",
            &DirectLinkRecord {
                name: "old.bin".into(),
                mime_type: "application/octet-stream".into(),
                size: 1,
                file_path: "/nonexistent/ferry/old.bin".into(),
                host: String::new(),
            },
        )
        .await?;
    let metrics = Metrics::new()?;
    let router = server(&store, &metrics).router();

    for uri in ["/api/file/unknown-id", "/api/file/gone"] {
        let response = router.clone().oneshot(get(uri)?).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), BODY_LIMIT).await?;
        let problem: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(problem["status"], 404);
        assert_eq!(problem["detail"], "file link is unknown or expired");
    }
    Ok(())
}

#[tokio::test]
async fn health_and_metrics_report_process_state() -> anyhow::Result<()> {
    let store = TransferStore::new(Arc::new(MemoryStore::new()));
    let metrics = Metrics::new()?;
    metrics.job_started();
    let router = server(&store, &metrics).router();

    let response = router.clone().oneshot(get("/health")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), BODY_LIMIT).await?;
    let health: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["mode"], "api");
    assert_eq!(health["metrics"]["active_jobs"], 1);

    let response = router.oneshot(get("/metrics")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), BODY_LIMIT).await?;
    let text = String::from_utf8(body.to_vec())?;
    assert!(text.contains("active_jobs 1"));
    assert!(text.contains("route=\"/health\""));
    Ok(())
}
