//! Torrent origin backed by one process-wide swarm client.

mod source;
mod transmission;

use std::path::Path;

use async_trait::async_trait;
use ferry_core::TransferResult;

pub use source::{DEFAULT_SAMPLE_INTERVAL, TORRENT_PLACEHOLDER_NAME, TorrentSource};
pub use transmission::{TransmissionClient, TransmissionConfig};

/// What the job asked to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentInput {
    /// Magnet URI.
    Magnet(String),
    /// Raw `.torrent` metainfo bytes.
    Metainfo(Vec<u8>),
}

/// Client-side identifier of one torrent handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TorrentHandle(pub i64);

/// Counters sampled from the swarm client for one handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwarmSnapshot {
    /// Torrent name once metadata is known.
    pub name: Option<String>,
    /// Completion in `0.0..=1.0`.
    pub progress: f64,
    /// Estimated seconds remaining, if known.
    pub eta_secs: Option<u64>,
    /// Connected peers.
    pub peers: u32,
    /// Download rate in bytes per second.
    pub download_rate: u64,
    /// Upload rate in bytes per second.
    pub upload_rate: u64,
    /// Total payload size in bytes.
    pub length: u64,
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Bytes uploaded so far.
    pub uploaded: u64,
    /// All wanted data is on disk.
    pub finished: bool,
    /// Client-reported error for the handle.
    pub error: Option<String>,
}

impl SwarmSnapshot {
    /// Completion as an integer percentage.
    #[must_use]
    pub fn percentage(&self) -> u8 {
        if !self.progress.is_finite() || self.progress <= 0.0 {
            return 0;
        }
        (self.progress.min(1.0) * 100.0).round() as u8
    }
}

/// Shared swarm client. Jobs own their handles, never the client.
#[async_trait]
pub trait SwarmClient: Send + Sync {
    /// Start downloading `input` into `download_dir`.
    async fn add(&self, input: &TorrentInput, download_dir: &Path) -> TransferResult<TorrentHandle>;

    /// Sample counters for a handle.
    async fn snapshot(&self, handle: TorrentHandle) -> TransferResult<SwarmSnapshot>;

    /// Destroy a handle, keeping downloaded data on disk.
    async fn remove(&self, handle: TorrentHandle) -> TransferResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_percentages_are_bounded() {
        let mut snapshot = SwarmSnapshot::default();
        assert_eq!(snapshot.percentage(), 0);
        snapshot.progress = 0.424;
        assert_eq!(snapshot.percentage(), 42);
        snapshot.progress = 1.7;
        assert_eq!(snapshot.percentage(), 100);
        snapshot.progress = f64::NAN;
        assert_eq!(snapshot.percentage(), 0);
    }
}
