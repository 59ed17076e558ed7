use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ferry_core::TransferResult;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use super::{SwarmClient, SwarmSnapshot, TorrentHandle, TorrentInput};
use crate::error::{ProviderError, ProviderResult, check_status};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";
/// Transmission reports local (non-tracker) errors with this code.
const LOCAL_ERROR: i64 = 3;
const STAT_FIELDS: &[&str] = &[
    "id",
    "name",
    "percentDone",
    "metadataPercentComplete",
    "leftUntilDone",
    "eta",
    "peersConnected",
    "rateDownload",
    "rateUpload",
    "sizeWhenDone",
    "downloadedEver",
    "uploadedEver",
    "error",
    "errorString",
];

/// Connection settings for a Transmission daemon sharing this host's disk.
#[derive(Debug, Clone)]
pub struct TransmissionConfig {
    /// RPC endpoint, e.g. `http://127.0.0.1:9091/transmission/rpc`.
    pub rpc_url: String,
    /// Optional basic-auth user.
    pub username: Option<String>,
    /// Optional basic-auth password.
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct AddedTorrent {
    id: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TorrentFields {
    name: String,
    percent_done: f64,
    metadata_percent_complete: f64,
    left_until_done: i64,
    eta: i64,
    peers_connected: i64,
    rate_download: i64,
    rate_upload: i64,
    size_when_done: i64,
    downloaded_ever: i64,
    uploaded_ever: i64,
    error: i64,
    error_string: String,
}

impl From<TorrentFields> for SwarmSnapshot {
    fn from(fields: TorrentFields) -> Self {
        let unsigned = |value: i64| u64::try_from(value).unwrap_or(0);
        Self {
            name: Some(fields.name).filter(|name| !name.is_empty()),
            progress: fields.percent_done,
            eta_secs: u64::try_from(fields.eta).ok(),
            peers: u32::try_from(fields.peers_connected).unwrap_or(0),
            download_rate: unsigned(fields.rate_download),
            upload_rate: unsigned(fields.rate_upload),
            length: unsigned(fields.size_when_done),
            downloaded: unsigned(fields.downloaded_ever),
            uploaded: unsigned(fields.uploaded_ever),
            finished: fields.metadata_percent_complete >= 1.0
                && fields.percent_done >= 1.0
                && fields.left_until_done == 0,
            error: (fields.error == LOCAL_ERROR).then_some(fields.error_string),
        }
    }
}

/// Swarm client speaking the Transmission RPC protocol.
pub struct TransmissionClient {
    http: reqwest::Client,
    config: TransmissionConfig,
    session_id: Mutex<Option<String>>,
}

impl TransmissionClient {
    /// Client for the daemon at `config.rpc_url`.
    #[must_use]
    pub fn new(http: reqwest::Client, config: TransmissionConfig) -> Self {
        Self {
            http,
            config,
            session_id: Mutex::new(None),
        }
    }

    async fn call(&self, method: &'static str, arguments: Value) -> ProviderResult<Value> {
        let payload = json!({ "method": method, "arguments": arguments });
        // One retry covers the 409 session handshake.
        for _ in 0..2 {
            let mut request = self.http.post(&self.config.rpc_url).json(&payload);
            if let Some(session) = self.session_id.lock().await.clone() {
                request = request.header(SESSION_HEADER, session);
            }
            if let Some(user) = &self.config.username {
                request = request.basic_auth(user, self.config.password.as_deref());
            }
            let response = request
                .send()
                .await
                .map_err(ProviderError::http("transmission.rpc"))?;
            if response.status() == StatusCode::CONFLICT {
                let session = response
                    .headers()
                    .get(SESSION_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ProviderError::protocol("transmission.rpc", "409 without a session id")
                    })?;
                debug!("transmission session id refreshed");
                *self.session_id.lock().await = Some(session);
                continue;
            }
            let body: RpcResponse = check_status("transmission.rpc", response)
                .await?
                .json()
                .await
                .map_err(ProviderError::http("transmission.rpc"))?;
            if body.result != "success" {
                return Err(ProviderError::protocol(
                    "transmission.rpc",
                    format!("{method}: {}", body.result),
                ));
            }
            return Ok(body.arguments);
        }
        Err(ProviderError::protocol(
            "transmission.rpc",
            "session handshake did not settle",
        ))
    }

    async fn add_torrent(&self, input: &TorrentInput, download_dir: &Path) -> ProviderResult<TorrentHandle> {
        let mut arguments = json!({ "download-dir": download_dir.to_string_lossy() });
        match input {
            TorrentInput::Magnet(uri) => arguments["filename"] = json!(uri),
            TorrentInput::Metainfo(bytes) => arguments["metainfo"] = json!(STANDARD.encode(bytes)),
        }
        let result = self.call("torrent-add", arguments).await?;
        let added = result
            .get("torrent-added")
            .or_else(|| result.get("torrent-duplicate"))
            .cloned()
            .ok_or_else(|| ProviderError::protocol("transmission.add", "no torrent in reply"))?;
        let added: AddedTorrent = serde_json::from_value(added)
            .map_err(|err| ProviderError::protocol("transmission.add", err.to_string()))?;
        Ok(TorrentHandle(added.id))
    }

    async fn torrent_fields(&self, handle: TorrentHandle) -> ProviderResult<TorrentFields> {
        let result = self
            .call("torrent-get", json!({ "ids": [handle.0], "fields": STAT_FIELDS }))
            .await?;
        let first = result
            .get("torrents")
            .and_then(Value::as_array)
            .and_then(|torrents| torrents.first())
            .cloned()
            .ok_or_else(|| {
                ProviderError::protocol("transmission.get", format!("torrent {} is gone", handle.0))
            })?;
        serde_json::from_value(first)
            .map_err(|err| ProviderError::protocol("transmission.get", err.to_string()))
    }
}

#[async_trait]
impl SwarmClient for TransmissionClient {
    async fn add(&self, input: &TorrentInput, download_dir: &Path) -> TransferResult<TorrentHandle> {
        self.add_torrent(input, download_dir)
            .await
            .map_err(ProviderError::into_fetch_failure)
    }

    async fn snapshot(&self, handle: TorrentHandle) -> TransferResult<SwarmSnapshot> {
        self.torrent_fields(handle)
            .await
            .map(SwarmSnapshot::from)
            .map_err(ProviderError::into_fetch_failure)
    }

    async fn remove(&self, handle: TorrentHandle) -> TransferResult<()> {
        self.call(
            "torrent-remove",
            json!({ "ids": [handle.0], "delete-local-data": false }),
        )
        .await
        .map(|_| ())
        .map_err(ProviderError::into_fetch_failure)
    }
}
