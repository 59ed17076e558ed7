use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ferry_core::{
    EndpointKind, Job, JobId, Source, StagedArtifact, TorrentStats, TransferContext,
    TransferError, TransferResult,
};
use ferry_store::TransferStore;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{SwarmClient, SwarmSnapshot, TorrentHandle, TorrentInput};

/// Interval between swarm counter samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);
/// Name reported until the swarm delivers metadata.
pub const TORRENT_PLACEHOLDER_NAME: &str = "torrent.file";
const FETCH_MESSAGE: &str = "Transferring from source";

/// Adds a magnet link or metainfo payload to the shared swarm and waits for completion.
pub struct TorrentSource {
    swarm: Arc<dyn SwarmClient>,
    store: TransferStore,
    interval: Duration,
    handles: Mutex<HashMap<JobId, TorrentHandle>>,
}

impl TorrentSource {
    /// Source sampling `swarm` every `interval`.
    #[must_use]
    pub fn new(swarm: Arc<dyn SwarmClient>, store: TransferStore, interval: Duration) -> Self {
        Self {
            swarm,
            store,
            interval,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Number of handles currently held by running jobs.
    #[must_use]
    pub fn active_handles(&self) -> usize {
        self.handles().len()
    }

    /// Handle map guard. Never held across an await, so a dropped fetch cannot
    /// lose a handle the swarm already created.
    fn handles(&self) -> MutexGuard<'_, HashMap<JobId, TorrentHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn record(&self, ctx: &TransferContext, snapshot: &SwarmSnapshot) {
        let stats = stats_for(&ctx.job, snapshot);
        if let Err(error) = self.store.record_torrent_stats(&ctx.job.key(), &stats).await {
            warn!(job_id = %ctx.job.id, %error, "torrent stats write failed");
        }
        ctx.report(&stats.name, FETCH_MESSAGE, stats.percentage).await;
    }
}

fn input_for(job: &Job) -> TransferResult<TorrentInput> {
    match &job.payload {
        Some(metainfo) if !metainfo.is_empty() => Ok(TorrentInput::Metainfo(metainfo.clone())),
        _ if job.source_url.starts_with("magnet:?") => {
            Ok(TorrentInput::Magnet(job.source_url.clone()))
        }
        _ => Err(TransferError::unrecognized(&job.source_url)),
    }
}

fn stats_for(job: &Job, snapshot: &SwarmSnapshot) -> TorrentStats {
    TorrentStats {
        name: snapshot
            .name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| TORRENT_PLACEHOLDER_NAME.to_string()),
        magnet_uri: job.source_url.clone(),
        message: FETCH_MESSAGE.to_string(),
        percentage: snapshot.percentage(),
        time_remaining: snapshot.eta_secs.unwrap_or(0),
        num_peers: snapshot.peers,
        download_speed: snapshot.download_rate,
        upload_speed: snapshot.upload_rate,
        length: snapshot.length,
        downloaded: snapshot.downloaded,
        uploaded: snapshot.uploaded,
    }
}

#[async_trait]
impl Source for TorrentSource {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Torrents
    }

    async fn fetch(&self, ctx: &TransferContext) -> TransferResult<StagedArtifact> {
        let input = input_for(&ctx.job)?;
        let staging = ctx.ensure_staging().await?.to_path_buf();
        let handle = self.swarm.add(&input, &staging).await?;
        self.handles().insert(ctx.job.id, handle);
        info!(job_id = %ctx.job.id, handle = handle.0, "torrent added");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let snapshot = self.swarm.snapshot(handle).await?;
            if let Some(error) = snapshot.error.as_deref().filter(|error| !error.is_empty()) {
                return Err(TransferError::unreachable("torrent.download", error));
            }
            self.record(ctx, &snapshot).await;
            if snapshot.finished {
                break;
            }
        }

        let artifact = ferry_staging::single_artifact(&staging).await?;
        info!(job_id = %ctx.job.id, name = %artifact.name, "torrent fetch finished");
        Ok(artifact)
    }

    async fn release(&self, job: &Job) -> TransferResult<()> {
        let handle = self.handles().remove(&job.id);
        let removed = match handle {
            Some(handle) => {
                let removed = self.swarm.remove(handle).await;
                debug!(job_id = %job.id, handle = handle.0, ok = removed.is_ok(), "torrent handle destroyed");
                removed
            }
            None => Ok(()),
        };
        self.store
            .remove_torrent_state(&job.key())
            .await
            .map_err(|err| TransferError::staging("torrent.release", err.to_string()))?;
        removed
    }
}

#[cfg(test)]
mod tests {
    use ferry_core::Route;
    use ferry_test_support::fixtures::job;

    use super::*;

    #[test]
    fn payload_wins_over_url() -> anyhow::Result<()> {
        let mut uploaded = job(Route::TorrentsToMega, "ubuntu.torrent", "uid");
        assert!(matches!(input_for(&uploaded), Err(TransferError::UnrecognizedUrl { .. })));
        uploaded.payload = Some(b"d4:infoe".to_vec());
        assert_eq!(input_for(&uploaded)?, TorrentInput::Metainfo(b"d4:infoe".to_vec()));

        let magnet = job(Route::TorrentsToDirect, "magnet:?xt=urn:btih:abc", "uid");
        assert_eq!(
            input_for(&magnet)?,
            TorrentInput::Magnet("magnet:?xt=urn:btih:abc".into())
        );
        Ok(())
    }

    #[test]
    fn stats_default_name_until_metadata() {
        let queued = job(Route::TorrentsToGDrive, "magnet:?xt=urn:btih:abc", "uid");
        let snapshot = SwarmSnapshot {
            progress: 0.5,
            peers: 4,
            ..SwarmSnapshot::default()
        };
        let stats = stats_for(&queued, &snapshot);
        assert_eq!(stats.name, TORRENT_PLACEHOLDER_NAME);
        assert_eq!(stats.percentage, 50);
        assert_eq!(stats.num_peers, 4);
        assert_eq!(stats.magnet_uri, "magnet:?xt=urn:btih:abc");
    }
}
