use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferry_core::{Route, Source, TransferContext, TransferError, TransferResult};
use ferry_providers::{SwarmClient, SwarmSnapshot, TorrentHandle, TorrentInput, TorrentSource};
use ferry_store::{MemoryStore, TransferStore};
use ferry_test_support::fixtures::{RecordingProgress, job};
use tokio::sync::Mutex;

/// Swarm replaying scripted snapshots; `add` writes the payload immediately.
#[derive(Default)]
struct StubSwarm {
    snapshots: Mutex<VecDeque<SwarmSnapshot>>,
    added: Mutex<Vec<TorrentInput>>,
    removed: Mutex<Vec<TorrentHandle>>,
}

impl StubSwarm {
    fn scripted(snapshots: Vec<SwarmSnapshot>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SwarmClient for StubSwarm {
    async fn add(&self, input: &TorrentInput, download_dir: &Path) -> TransferResult<TorrentHandle> {
        self.added.lock().await.push(input.clone());
        let path = download_dir.join("ubuntu.iso");
        tokio::fs::write(&path, b"iso-bytes")
            .await
            .map_err(|err| TransferError::staging_io("stub.write", &path, err))?;
        Ok(TorrentHandle(7))
    }

    async fn snapshot(&self, _handle: TorrentHandle) -> TransferResult<SwarmSnapshot> {
        let mut snapshots = self.snapshots.lock().await;
        match snapshots.len() {
            0 => Err(TransferError::unreachable("stub.snapshot", "script exhausted")),
            1 => Ok(snapshots[0].clone()),
            _ => Ok(snapshots.pop_front().unwrap_or_default()),
        }
    }

    async fn remove(&self, handle: TorrentHandle) -> TransferResult<()> {
        self.removed.lock().await.push(handle);
        Ok(())
    }
}

fn sample(progress: f64, finished: bool) -> SwarmSnapshot {
    SwarmSnapshot {
        name: Some("ubuntu.iso".into()),
        progress,
        peers: 3,
        length: 9,
        downloaded: (9.0 * progress) as u64,
        finished,
        ..SwarmSnapshot::default()
    }
}

#[tokio::test]
async fn magnet_downloads_report_stats_until_finished() -> anyhow::Result<()> {
    let swarm = Arc::new(StubSwarm::scripted(vec![
        SwarmSnapshot::default(),
        sample(0.5, false),
        sample(1.0, true),
    ]));
    let store = TransferStore::new(Arc::new(MemoryStore::new()));
    let source = TorrentSource::new(swarm.clone(), store.clone(), Duration::from_millis(10));

    let temp = tempfile::tempdir()?;
    let progress = Arc::new(RecordingProgress::default());
    let magnet = "magnet:?xt=urn:btih:abc123";
    let ctx = TransferContext::new(
        job(Route::TorrentsToGDrive, magnet, "uid"),
        temp.path().join("job-1"),
        progress.clone(),
    );

    let artifact = source.fetch(&ctx).await?;
    assert_eq!(artifact.name, "ubuntu.iso");
    assert_eq!(artifact.size_bytes, 9);
    assert_eq!(progress.percentages().await, vec![0, 50, 100]);
    assert_eq!(
        swarm.added.lock().await.as_slice(),
        [TorrentInput::Magnet(magnet.into())]
    );

    let stats = store
        .torrent_stats(&ctx.job.key())
        .await?
        .ok_or_else(|| anyhow::anyhow!("stats missing"))?;
    assert_eq!(stats.percentage, 100);
    assert_eq!(stats.num_peers, 3);
    assert_eq!(stats.magnet_uri, magnet);
    assert_eq!(source.active_handles(), 1);

    source.release(&ctx.job).await?;
    assert_eq!(swarm.removed.lock().await.as_slice(), [TorrentHandle(7)]);
    assert_eq!(source.active_handles(), 0);
    assert!(store.torrent_stats(&ctx.job.key()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn swarm_errors_fail_the_fetch_and_release_still_destroys_the_handle() -> anyhow::Result<()> {
    let swarm = Arc::new(StubSwarm::scripted(vec![SwarmSnapshot {
        error: Some("No data found! Ensure your drives are connected".into()),
        ..SwarmSnapshot::default()
    }]));
    let store = TransferStore::new(Arc::new(MemoryStore::new()));
    let source = TorrentSource::new(swarm.clone(), store, Duration::from_millis(10));

    let temp = tempfile::tempdir()?;
    let mut queued = job(Route::TorrentsToMega, "ubuntu.torrent", "uid");
    queued.payload = Some(b"d4:infod4:name10:ubuntu.isoee".to_vec());
    let ctx = TransferContext::new(
        queued,
        temp.path().join("job-1"),
        Arc::new(RecordingProgress::default()),
    );

    let err = source.fetch(&ctx).await.unwrap_err();
    assert_eq!(err.kind(), "source_unreachable");
    assert!(matches!(
        swarm.added.lock().await.as_slice(),
        [TorrentInput::Metainfo(bytes)] if bytes.starts_with(b"d4:info")
    ));

    source.release(&ctx.job).await?;
    assert_eq!(swarm.removed.lock().await.len(), 1);
    source.release(&ctx.job).await?;
    assert_eq!(swarm.removed.lock().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn abandoned_fetches_leave_a_releasable_handle() -> anyhow::Result<()> {
    let swarm = Arc::new(StubSwarm::scripted(vec![sample(0.2, false)]));
    let store = TransferStore::new(Arc::new(MemoryStore::new()));
    let source = TorrentSource::new(swarm.clone(), store, Duration::from_millis(5));

    let temp = tempfile::tempdir()?;
    let ctx = TransferContext::new(
        job(Route::TorrentsToDirect, "magnet:?xt=urn:btih:def456", "uid"),
        temp.path().join("job-1"),
        Arc::new(RecordingProgress::default()),
    );

    let abandoned = tokio::time::timeout(Duration::from_millis(40), source.fetch(&ctx)).await;
    assert!(abandoned.is_err());
    assert_eq!(source.active_handles(), 1);

    source.release(&ctx.job).await?;
    assert_eq!(swarm.removed.lock().await.as_slice(), [TorrentHandle(7)]);
    assert_eq!(source.active_handles(), 0);
    Ok(())
}
