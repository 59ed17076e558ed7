#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]
#![allow(clippy::module_name_repetitions)]

//! Endpoint adapters implementing the `Source` and `Sink` capabilities.
//!
//! Layout: `gdrive/` (Drive REST client, source, sink), `mega/` (MEGAcmd driver),
//! `direct.rs` (HTTP origin), `torrent/` (swarm client and source),
//! `direct_link.rs` (served-file destination), `progress.rs` (percentage helpers),
//! `error.rs` (provider failures and their job-level mapping).

pub mod direct;
pub mod direct_link;
pub mod error;
pub mod gdrive;
pub mod mega;
pub mod progress;
pub mod torrent;

pub use direct::{DirectSource, FALLBACK_NAME};
pub use direct_link::DirectLinkSink;
pub use error::{ProviderError, ProviderResult};
pub use gdrive::{DriveClient, DriveConfig, DriveTarget, GDriveSink, GDriveSource};
pub use mega::{DEFAULT_QUOTA_EXIT_CODE, MegaConfig, MegaSink, MegaSource, MegaUrl};
pub use progress::{ByteProgress, ProgressPump, percent_of};
pub use torrent::{
    DEFAULT_SAMPLE_INTERVAL, SwarmClient, SwarmSnapshot, TORRENT_PLACEHOLDER_NAME, TorrentHandle,
    TorrentInput, TorrentSource, TransmissionClient, TransmissionConfig,
};
