//! Default values applied when a variable is unset.

pub(crate) const HTTP_PORT: u16 = 8080;
pub(crate) const LOG_LEVEL: &str = "info";
pub(crate) const STAGING_DIR: &str = "ferry-staging";
pub(crate) const SERVED_DIR: &str = "ferry-served";
pub(crate) const DEFAULT_HOST: &str = "localhost";
pub(crate) const IP_LOOKUP_URL: &str = "https://api64.ipify.org?format=json";
pub(crate) const FOLDER_NAME: &str = "Ferry";
pub(crate) const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub(crate) const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
pub(crate) const DRIVE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub(crate) const MEGA_GET_BIN: &str = "mega-get";
pub(crate) const MEGA_PUT_BIN: &str = "mega-put";
pub(crate) const MEGA_EXPORT_BIN: &str = "mega-export";
/// MEGAcmd reports an exhausted transfer quota as `-17`, seen as 239 by the parent.
pub(crate) const MEGA_QUOTA_EXIT_CODE: i32 = 239;
pub(crate) const TRANSMISSION_URL: &str = "http://127.0.0.1:9091/transmission/rpc";
pub(crate) const TORRENT_SAMPLE_SECS: u64 = 5;
pub(crate) const FCM_ENDPOINT: &str = "https://fcm.googleapis.com";
pub(crate) const QUEUE_LEASE_SECS: u64 = 30 * 60;
pub(crate) const QUEUE_POLL_MILLIS: u64 = 1_000;
