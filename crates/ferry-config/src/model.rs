//! Typed configuration sections.

use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Role a process plays in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Serve the HTTP surface only.
    Api,
    /// Consume non-torrent routes.
    Worker,
    /// Consume torrent routes; owns the swarm client.
    TorrentWorker,
    /// Process removal requests.
    Janitor,
    /// Every role in one process.
    All,
}

impl AppMode {
    /// Lowercase name used in configuration and span fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Worker => "worker",
            Self::TorrentWorker => "torrent-worker",
            Self::Janitor => "janitor",
            Self::All => "all",
        }
    }

    /// Whether the HTTP surface runs in this mode.
    #[must_use]
    pub const fn serves_http(self) -> bool {
        matches!(self, Self::Api | Self::All)
    }

    /// Whether standard transfer routes are consumed in this mode.
    #[must_use]
    pub const fn runs_worker(self) -> bool {
        matches!(self, Self::Worker | Self::All)
    }

    /// Whether torrent routes are consumed in this mode.
    #[must_use]
    pub const fn runs_torrent_worker(self) -> bool {
        matches!(self, Self::TorrentWorker | Self::All)
    }

    /// Whether removal requests are processed in this mode.
    #[must_use]
    pub const fn runs_janitor(self) -> bool {
        matches!(self, Self::Janitor | Self::All)
    }
}

impl Display for AppMode {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for AppMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "worker" => Ok(Self::Worker),
            "torrent-worker" | "torrent_worker" => Ok(Self::TorrentWorker),
            "janitor" => Ok(Self::Janitor),
            "all" => Ok(Self::All),
            _ => Err(ConfigError::InvalidAppMode {
                value: value.to_string(),
            }),
        }
    }
}

/// Process role, listener and logging.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Role of this process.
    pub mode: AppMode,
    /// Listener address for the HTTP surface.
    pub listen: SocketAddr,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Explicit log format (`json` or `pretty`); inferred from the build when unset.
    pub log_format: Option<String>,
}

/// Local disk layout.
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Parent of the per-job staging directories.
    pub root: PathBuf,
    /// Directory holding files served through direct links.
    pub served_root: PathBuf,
}

/// Direct-link addressing.
#[derive(Debug, Clone)]
pub struct LinksConfig {
    /// Host used when this host has no DNS registration.
    pub default_host: String,
    /// Fixed public IP, skipping discovery.
    pub public_ip: Option<IpAddr>,
    /// Public IP discovery endpoint.
    pub ip_lookup_url: String,
}

/// Drive API credentials and endpoints.
#[derive(Debug, Clone)]
pub struct GDriveSettings {
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Well-known upload folder.
    pub folder_name: String,
    /// Metadata API base.
    pub api_base: String,
    /// Upload API base.
    pub upload_base: String,
    /// OAuth token endpoint.
    pub token_url: String,
}

/// MEGAcmd commands.
#[derive(Debug, Clone)]
pub struct MegaSettings {
    /// Download command.
    pub get_bin: String,
    /// Upload command.
    pub put_bin: String,
    /// Export command.
    pub export_bin: String,
    /// Remote upload folder.
    pub folder_name: String,
    /// Exit status signalling an exhausted quota.
    pub quota_exit_code: i32,
}

/// Swarm client connection.
#[derive(Debug, Clone)]
pub struct TorrentSettings {
    /// Transmission RPC endpoint.
    pub rpc_url: String,
    /// Optional RPC user.
    pub username: Option<String>,
    /// Optional RPC password.
    pub password: Option<String>,
    /// Interval between swarm samples.
    pub sample_interval: Duration,
}

/// Push notification delivery.
#[derive(Debug, Clone)]
pub struct FcmConfig {
    /// Firebase project identifier; notifications are skipped when unset.
    pub project_id: Option<String>,
    /// OAuth bearer token for the FCM v1 API.
    pub access_token: Option<String>,
    /// API base URL.
    pub endpoint: String,
}

impl FcmConfig {
    /// Whether enough is configured to send notifications.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.project_id.is_some() && self.access_token.is_some()
    }
}

/// Queue leasing.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Lease granted per reservation; renewed while a job runs.
    pub lease: Duration,
    /// Delay between empty polls.
    pub poll_interval: Duration,
}

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct FerryConfig {
    /// `PostgreSQL` connection string; in-memory backends are used when unset.
    pub database_url: Option<String>,
    /// Process role and listener.
    pub app: AppConfig,
    /// Local disk layout.
    pub staging: StagingConfig,
    /// Direct-link addressing.
    pub links: LinksConfig,
    /// Drive settings.
    pub gdrive: GDriveSettings,
    /// Mega settings.
    pub mega: MegaSettings,
    /// Swarm settings.
    pub torrent: TorrentSettings,
    /// Push notifications.
    pub fcm: FcmConfig,
    /// Queue leasing.
    pub queue: QueueConfig,
}
