use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use ferry_core::{DnsRecord, Route, Sink, Source, StagedArtifact, TransferContext};
use ferry_links::{DirectLinkRegistry, StaticIpResolver, file_id, file_id_from_url};
use ferry_providers::{DirectLinkSink, DirectSource, FALLBACK_NAME};
use ferry_store::{MemoryStore, TransferStore};
use ferry_test_support::fixtures::{RecordingProgress, job};
use httpmock::prelude::*;

#[tokio::test]
async fn download_uses_content_disposition_name() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(GET).path("/download");
        then.status(200)
            .header("Content-Disposition", "attachment; filename=\"report.pdf\"")
            .body(vec![7_u8; 4096]);
    });

    let temp = tempfile::tempdir()?;
    let progress = Arc::new(RecordingProgress::default());
    let ctx = TransferContext::new(
        job(Route::DirectToGDrive, &server.url("/download?id=9"), "uid"),
        temp.path().join("job-1"),
        progress.clone(),
    );
    let artifact = DirectSource::new(reqwest::Client::new()).fetch(&ctx).await?;

    assert_eq!(artifact.name, "report.pdf");
    assert_eq!(artifact.mime_type, "application/pdf");
    assert_eq!(artifact.size_bytes, 4096);
    assert_eq!(progress.percentages().await.last(), Some(&100));
    mock.assert();
    Ok(())
}

#[tokio::test]
async fn name_falls_back_to_url_then_placeholder() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/files/movie.mkv");
        then.status(200).body("frames");
    });
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200).body("root");
    });

    let temp = tempfile::tempdir()?;
    let source = DirectSource::new(reqwest::Client::new());
    let ctx = TransferContext::new(
        job(Route::DirectToMega, &server.url("/files/movie.mkv"), "uid"),
        temp.path().join("job-1"),
        Arc::new(RecordingProgress::default()),
    );
    assert_eq!(source.fetch(&ctx).await?.name, "movie.mkv");

    let ctx = TransferContext::new(
        job(Route::DirectToMega, &server.url("/"), "uid"),
        temp.path().join("job-2"),
        Arc::new(RecordingProgress::default()),
    );
    assert_eq!(source.fetch(&ctx).await?.name, FALLBACK_NAME);
    Ok(())
}

#[tokio::test]
async fn http_errors_are_source_failures() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/gone");
        then.status(404).body("not here");
    });
    let temp = tempfile::tempdir()?;
    let ctx = TransferContext::new(
        job(Route::DirectToGDrive, &server.url("/gone"), "uid"),
        temp.path().join("job-1"),
        Arc::new(RecordingProgress::default()),
    );
    let err = DirectSource::new(reqwest::Client::new())
        .fetch(&ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "source_unreachable");
    assert!(!temp.path().join("job-1").exists());

    let ctx = TransferContext::new(
        job(Route::DirectToGDrive, "ftp://host/file", "uid"),
        temp.path().join("job-2"),
        Arc::new(RecordingProgress::default()),
    );
    let err = DirectSource::new(reqwest::Client::new())
        .fetch(&ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unrecognized_url");
    Ok(())
}

#[tokio::test]
async fn direct_link_sink_serves_from_the_registered_host() -> anyhow::Result<()> {
    let store = TransferStore::new(Arc::new(MemoryStore::new()));
    store
        .register_dns(&DnsRecord {
            name: "node-2.ferry.example".into(),
            ip: "203.0.113.9".into(),
        })
        .await?;
    let registry = DirectLinkRegistry::new(
        store.clone(),
        Arc::new(StaticIpResolver(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)))),
        "ferry.example",
    );

    let temp = tempfile::tempdir()?;
    let staging = temp.path().join("job-1");
    tokio::fs::create_dir_all(&staging).await?;
    let staged = staging.join("clip.mp4");
    tokio::fs::write(&staged, b"clip").await?;
    let artifact = StagedArtifact {
        name: "clip.mp4".into(),
        path: staged.clone(),
        mime_type: "video/mp4".into(),
        size_bytes: 4,
        is_directory: false,
    };
    let served_root = temp.path().join("served");
    let ctx = TransferContext::new(
        job(Route::MegaToDirect, "https://mega.nz/file/Ab12#key", "uid"),
        staging.clone(),
        Arc::new(RecordingProgress::default()),
    );

    let url = DirectLinkSink::new(registry.clone(), &served_root)
        .publish(&ctx, &artifact)
        .await?;
    let id = file_id(&ctx.job.owner_id, ctx.job.route, &ctx.job.name);
    assert_eq!(url, format!("https://node-2.ferry.example/api/file/{id}"));
    assert_eq!(file_id_from_url(&url), Some(id.as_str()));
    assert!(!staged.exists());

    let record = registry.resolve(&id).await?.expect("registered record");
    assert_eq!(record.name, "clip.mp4");
    assert_eq!(record.size, 4);
    assert_eq!(record.file_path, served_root.join(&id).join("clip.mp4"));
    assert_eq!(tokio::fs::read(&record.file_path).await?, b"clip");
    Ok(())
}

#[tokio::test]
async fn duplicate_jobs_keep_the_file_already_served() -> anyhow::Result<()> {
    let store = TransferStore::new(Arc::new(MemoryStore::new()));
    let registry = DirectLinkRegistry::new(
        store,
        Arc::new(StaticIpResolver(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)))),
        "ferry.example",
    );
    let temp = tempfile::tempdir()?;
    let served_root = temp.path().join("served");
    let sink = DirectLinkSink::new(registry, &served_root);
    let source_url = "https://mega.nz/file/Dup1#key";

    let mut urls = Vec::new();
    let mut staged = Vec::new();
    for (n, body) in [b"clip", b"CLIP"].into_iter().enumerate() {
        let staging = temp.path().join(format!("job-{n}"));
        tokio::fs::create_dir_all(&staging).await?;
        let path = staging.join("clip.mp4");
        tokio::fs::write(&path, body).await?;
        let artifact = StagedArtifact {
            name: "clip.mp4".into(),
            path: path.clone(),
            mime_type: "video/mp4".into(),
            size_bytes: 4,
            is_directory: false,
        };
        let ctx = TransferContext::new(
            job(Route::MegaToDirect, source_url, "uid"),
            staging,
            Arc::new(RecordingProgress::default()),
        );
        urls.push(sink.publish(&ctx, &artifact).await?);
        staged.push(path);
    }

    assert_eq!(urls[0], urls[1]);
    let id = file_id_from_url(&urls[0]).ok_or_else(|| anyhow::anyhow!("no file id"))?;
    let served = served_root.join(id).join("clip.mp4");
    assert_eq!(tokio::fs::read(&served).await?, b"clip");
    assert!(!staged[0].exists());
    assert!(staged[1].exists());
    Ok(())
}
