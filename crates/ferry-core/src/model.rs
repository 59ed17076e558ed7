//! Jobs, staged artifacts and the documents written about them.

use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::route::{EndpointKind, Route, UnknownRoute};

/// Number of hex characters kept from the source URL digest when naming a job.
const JOB_NAME_LEN: usize = 10;

/// Derive the dashboard-facing job name from the source URL.
///
/// The name is not a deduplication key; duplicate enqueues stay independent.
#[must_use]
pub fn job_name(source_url: &str) -> String {
    let digest = hex::encode(Sha256::digest(source_url.as_bytes()));
    digest[..JOB_NAME_LEN].to_string()
}

/// Queue-assigned identifier, unique per enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Allocate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Opaque identifier of the user owning a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for OwnerId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// `(owner, route, job)` triple keying every per-job document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    /// Owning user.
    pub owner_id: OwnerId,
    /// Route the job runs on.
    pub route: Route,
    /// Queue-assigned identifier.
    pub job_id: JobId,
}

/// Request accepted by the queue's `enqueue` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Route the job runs on.
    pub route: Route,
    /// Source URL; its interpretation depends on the route.
    pub source_url: String,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Optional route-specific payload such as uploaded torrent metadata.
    pub payload: Option<Vec<u8>>,
}

impl JobRequest {
    /// Build a request for a known route.
    #[must_use]
    pub fn new(route: Route, source_url: impl Into<String>, owner_id: impl Into<OwnerId>) -> Self {
        Self {
            route,
            source_url: source_url.into(),
            owner_id: owner_id.into(),
            payload: None,
        }
    }

    /// Build a request from a route name, rejecting names outside the route table.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownRoute`] when `route` is not a supported route name.
    pub fn named(
        route: &str,
        source_url: impl Into<String>,
        owner_id: impl Into<OwnerId>,
    ) -> Result<Self, UnknownRoute> {
        Ok(Self::new(route.parse()?, source_url, owner_id))
    }

    /// Attach a route-specific binary payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A unit of queued work as seen by the consuming worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Queue-assigned identifier.
    pub id: JobId,
    /// Dashboard name derived from the source URL.
    pub name: String,
    /// Route the job runs on.
    pub route: Route,
    /// Source URL.
    pub source_url: String,
    /// Owning user.
    pub owner_id: OwnerId,
    /// Optional route-specific payload.
    pub payload: Option<Vec<u8>>,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
    /// Time the job was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Materialise a job from an accepted request.
    #[must_use]
    pub fn from_request(id: JobId, request: JobRequest, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: job_name(&request.source_url),
            route: request.route,
            source_url: request.source_url,
            owner_id: request.owner_id,
            payload: request.payload,
            attempt: 1,
            enqueued_at,
        }
    }

    /// Identifying triple for per-job documents.
    #[must_use]
    pub fn key(&self) -> JobKey {
        JobKey {
            owner_id: self.owner_id.clone(),
            route: self.route,
            job_id: self.id,
        }
    }

    /// Wire payload as stored by the queue.
    #[must_use]
    pub fn wire_payload(&self) -> JobPayload {
        JobPayload {
            queue: self.route.name().to_string(),
            url: self.source_url.clone(),
            uid: self.owner_id.0.clone(),
            kwargs: Map::new(),
        }
    }
}

/// Queue payload `{queue, url, uid, ...kwargs}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Route name.
    pub queue: String,
    /// Source URL.
    pub url: String,
    /// Owning user.
    pub uid: String,
    /// Optional route-specific keyword arguments.
    #[serde(flatten)]
    pub kwargs: Map<String, Value>,
}

/// The single file or directory tree occupying a job's staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    /// Display name (the final path component).
    pub name: String,
    /// Absolute path on disk.
    pub path: PathBuf,
    /// MIME type; `inode/directory` for directories.
    pub mime_type: String,
    /// Size in bytes; aggregate size for directories.
    pub size_bytes: u64,
    /// Whether the artifact is a directory tree.
    pub is_directory: bool,
}

/// Permanent history entry written once on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// Cloud-drive link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g_drive_link: Option<String>,
    /// Mega-like export link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mega_link: Option<String>,
    /// Direct HTTP link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_link: Option<String>,
    /// Magnet link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnet_link: Option<String>,
    /// Creation time, stored as epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Display name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type.
    pub mime_type: String,
}

impl TransferRecord {
    /// Build the record for a completed route, populating exactly the source and
    /// destination link fields.
    #[must_use]
    pub fn new(
        route: Route,
        source_url: &str,
        destination_url: &str,
        artifact: &StagedArtifact,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            g_drive_link: None,
            mega_link: None,
            direct_link: None,
            magnet_link: None,
            timestamp,
            name: artifact.name.clone(),
            size: artifact.size_bytes,
            mime_type: artifact.mime_type.clone(),
        };
        *record.link_mut(route.source()) = Some(source_url.to_string());
        *record.link_mut(route.destination()) = Some(destination_url.to_string());
        record
    }

    /// Link recorded for the given endpoint class.
    #[must_use]
    pub fn link(&self, kind: EndpointKind) -> Option<&str> {
        match kind {
            EndpointKind::GDrive => self.g_drive_link.as_deref(),
            EndpointKind::Mega => self.mega_link.as_deref(),
            EndpointKind::Direct => self.direct_link.as_deref(),
            EndpointKind::Torrents => self.magnet_link.as_deref(),
        }
    }

    /// Number of non-empty endpoint fields.
    #[must_use]
    pub fn populated_endpoints(&self) -> usize {
        [
            EndpointKind::GDrive,
            EndpointKind::Mega,
            EndpointKind::Direct,
            EndpointKind::Torrents,
        ]
        .into_iter()
        .filter(|kind| self.link(*kind).is_some_and(|link| !link.is_empty()))
        .count()
    }

    fn link_mut(&mut self, kind: EndpointKind) -> &mut Option<String> {
        match kind {
            EndpointKind::GDrive => &mut self.g_drive_link,
            EndpointKind::Mega => &mut self.mega_link,
            EndpointKind::Direct => &mut self.direct_link,
            EndpointKind::Torrents => &mut self.magnet_link,
        }
    }
}

/// Transient in-flight status; its presence means the job is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Display name.
    pub name: String,
    /// Human-readable stage message.
    pub message: String,
    /// Integer percentage between 0 and 100.
    pub percentage: u8,
}

impl ProgressRecord {
    /// Build a record, clamping the percentage to 100.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>, percentage: u8) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            percentage: percentage.min(100),
        }
    }
}

/// Registry entry addressing a staged file served by one of this system's hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectLinkRecord {
    /// Download filename.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Absolute path on the serving host.
    pub file_path: PathBuf,
    /// Public host name of the host holding `file_path`. Empty when unknown,
    /// in which case any host may clean the record up.
    #[serde(default)]
    pub host: String,
}

impl DirectLinkRecord {
    /// Whether the file lives on `host`, or the record names no host.
    #[must_use]
    pub fn is_served_by(&self, host: &str) -> bool {
        self.host.is_empty() || self.host == host
    }
}

/// Host name registered for a public IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Host name.
    pub name: String,
    /// Public IP address.
    pub ip: String,
}

/// Periodic snapshot of swarm counters for a torrent job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TorrentStats {
    /// Torrent name, or a placeholder until metadata arrives.
    pub name: String,
    /// Magnet URI the job was enqueued with.
    #[serde(rename = "magnetURI")]
    pub magnet_uri: String,
    /// Human-readable stage message.
    pub message: String,
    /// Integer completion percentage.
    pub percentage: u8,
    /// Estimated seconds remaining.
    pub time_remaining: u64,
    /// Connected peers.
    pub num_peers: u32,
    /// Download rate in bytes per second.
    pub download_speed: u64,
    /// Upload rate in bytes per second.
    pub upload_speed: u64,
    /// Total payload length in bytes.
    pub length: u64,
    /// Bytes downloaded.
    pub downloaded: u64,
    /// Bytes uploaded.
    pub uploaded: u64,
}
