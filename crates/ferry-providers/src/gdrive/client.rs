use std::path::Path;
use std::sync::Arc;

use ferry_core::{OwnerId, TransferContext, TransferError, TransferResult};
use ferry_store::TransferStore;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, LOCATION};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::DriveConfig;
use crate::error::{ProviderError, ProviderResult, check_status};
use crate::progress::{ByteProgress, ProgressPump};

/// MIME type Drive uses for folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const NATIVE_DOCUMENT_PREFIX: &str = "application/vnd.google-apps.";
const FILE_FIELDS: &str = "id,name,mimeType,size";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,size)";

/// File or folder metadata as returned by Drive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// Object id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// MIME type.
    #[serde(default)]
    pub mime_type: String,
    /// Size in bytes; absent for folders and native documents.
    #[serde(default, deserialize_with = "size_from_string")]
    pub size: Option<u64>,
}

impl DriveFile {
    /// Whether the object is a folder.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    /// Whether the object is a native document that has no binary content.
    #[must_use]
    pub fn is_native_document(&self) -> bool {
        !self.is_folder() && self.mime_type.starts_with(NATIVE_DOCUMENT_PREFIX)
    }
}

fn size_from_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| raw.parse().map_err(serde::de::Error::custom))
        .transpose()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewLink {
    web_view_link: Option<String>,
}

/// Shared Drive client; hands out per-owner authorised sessions.
#[derive(Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    config: Arc<DriveConfig>,
    store: TransferStore,
}

impl DriveClient {
    /// Build a client reading owner refresh tokens from `store`.
    #[must_use]
    pub fn new(http: reqwest::Client, config: DriveConfig, store: TransferStore) -> Self {
        Self {
            http,
            config: Arc::new(config),
            store,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// Exchange the owner's stored refresh token for an access token.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::AuthMissing`] when no refresh token is stored and
    /// `failure` applied to the provider error when the exchange fails.
    pub async fn session(
        &self,
        owner_id: &OwnerId,
        failure: fn(ProviderError) -> TransferError,
    ) -> TransferResult<DriveSession> {
        let refresh_token = self
            .store
            .refresh_token(owner_id)
            .await
            .map_err(|err| TransferError::unreachable_with("drive.refresh_token", err))?
            .filter(|token| !token.is_empty())
            .ok_or_else(|| TransferError::AuthMissing {
                owner_id: owner_id.to_string(),
            })?;
        let token = self.exchange(&refresh_token).await.map_err(failure)?;
        debug!(owner_id = %owner_id, "drive session opened");
        Ok(DriveSession {
            http: self.http.clone(),
            config: Arc::clone(&self.config),
            access_token: token,
        })
    }

    async fn exchange(&self, refresh_token: &str) -> ProviderResult<String> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(ProviderError::http("drive.token"))?;
        let token: TokenResponse = check_status("drive.token", response)
            .await?
            .json()
            .await
            .map_err(ProviderError::http("drive.token"))?;
        Ok(token.access_token)
    }
}

/// Authorised calls on behalf of one owner.
pub struct DriveSession {
    http: reqwest::Client,
    config: Arc<DriveConfig>,
    access_token: String,
}

impl DriveSession {
    fn api(&self, path: &str) -> String {
        format!("{}/{path}", self.config.api_base.trim_end_matches('/'))
    }

    /// Fetch metadata for one object.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or Drive rejects it.
    pub async fn metadata(&self, id: &str) -> ProviderResult<DriveFile> {
        let response = self
            .http
            .get(self.api(&format!("files/{id}")))
            .bearer_auth(&self.access_token)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(ProviderError::http("drive.metadata"))?;
        check_status("drive.metadata", response)
            .await?
            .json()
            .await
            .map_err(ProviderError::http("drive.metadata"))
    }

    /// List the direct children of a folder, following pagination.
    ///
    /// # Errors
    ///
    /// Returns an error when any page request fails.
    pub async fn children(&self, parent_id: &str) -> ProviderResult<Vec<DriveFile>> {
        let query = format!("'{}' in parents and trashed=false", escape_query(parent_id));
        self.list(&query).await
    }

    /// Find a folder by name, optionally below `parent_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the search fails.
    pub async fn find_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> ProviderResult<Option<DriveFile>> {
        let mut query = format!(
            "mimeType='{FOLDER_MIME}' and name='{}' and trashed=false",
            escape_query(name)
        );
        if let Some(parent) = parent_id {
            query.push_str(&format!(" and '{}' in parents", escape_query(parent)));
        }
        Ok(self.list(&query).await?.into_iter().next())
    }

    async fn list(&self, query: &str) -> ProviderResult<Vec<DriveFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![("q", query.to_string()), ("fields", LIST_FIELDS.to_string())];
            if let Some(token) = page_token.take() {
                params.push(("pageToken", token));
            }
            let response = self
                .http
                .get(self.api("files"))
                .bearer_auth(&self.access_token)
                .query(&params)
                .send()
                .await
                .map_err(ProviderError::http("drive.list"))?;
            let page: FileList = check_status("drive.list", response)
                .await?
                .json()
                .await
                .map_err(ProviderError::http("drive.list"))?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(files),
            }
        }
    }

    /// Create a folder, optionally below `parent_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when Drive rejects the request.
    pub async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> ProviderResult<DriveFile> {
        let mut body = json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(parent) = parent_id {
            body["parents"] = json!([parent]);
        }
        let response = self
            .http
            .post(self.api("files"))
            .bearer_auth(&self.access_token)
            .query(&[("fields", FILE_FIELDS)])
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::http("drive.create_folder"))?;
        check_status("drive.create_folder", response)
            .await?
            .json()
            .await
            .map_err(ProviderError::http("drive.create_folder"))
    }

    /// Stream a file's content to `destination`, reporting byte progress.
    ///
    /// # Errors
    ///
    /// Returns an error when the download or the local write fails.
    pub async fn download_to(
        &self,
        file: &DriveFile,
        destination: &Path,
        ctx: &TransferContext,
        message: &str,
    ) -> ProviderResult<u64> {
        let response = self
            .http
            .get(self.api(&format!("files/{}", file.id)))
            .bearer_auth(&self.access_token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(ProviderError::http("drive.download"))?;
        let response = check_status("drive.download", response).await?;
        let mut output = tokio::fs::File::create(destination)
            .await
            .map_err(ProviderError::io("drive.download.create", destination))?;
        let mut progress = ByteProgress::new(file.size.or(response.content_length()));
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ProviderError::http("drive.download"))?;
            output
                .write_all(&chunk)
                .await
                .map_err(ProviderError::io("drive.download.write", destination))?;
            if let Some(percentage) = progress.advance(chunk.len() as u64) {
                ctx.report(&file.name, message, percentage).await;
            }
        }
        output
            .flush()
            .await
            .map_err(ProviderError::io("drive.download.flush", destination))?;
        Ok(progress.done())
    }

    /// Upload a local file into `parent_id` with a resumable session.
    ///
    /// # Errors
    ///
    /// Returns an error when the session cannot be opened or the upload fails.
    pub async fn upload_file(
        &self,
        path: &Path,
        name: &str,
        mime_type: &str,
        parent_id: &str,
        pump: &ProgressPump,
    ) -> ProviderResult<DriveFile> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(ProviderError::io("drive.upload.stat", path))?
            .len();
        let session = self
            .http
            .post(format!(
                "{}/files",
                self.config.upload_base.trim_end_matches('/')
            ))
            .bearer_auth(&self.access_token)
            .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", size.to_string())
            .json(&json!({ "name": name, "mimeType": mime_type, "parents": [parent_id] }))
            .send()
            .await
            .map_err(ProviderError::http("drive.upload.session"))?;
        let session = check_status("drive.upload.session", session).await?;
        let location = session
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::protocol("drive.upload.session", "upload session has no location")
            })?;

        let file = tokio::fs::File::open(path)
            .await
            .map_err(ProviderError::io("drive.upload.open", path))?;
        let sender = pump.sender();
        let mut progress = ByteProgress::new(Some(size));
        let stream = ReaderStream::new(file).inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                if let Some(percentage) = progress.advance(bytes.len() as u64) {
                    sender.send_replace(percentage);
                }
            }
        });
        let response = self
            .http
            .put(location)
            .bearer_auth(&self.access_token)
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .map_err(ProviderError::http("drive.upload"))?;
        check_status("drive.upload", response)
            .await?
            .json()
            .await
            .map_err(ProviderError::http("drive.upload"))
    }

    /// Grant anyone-with-link read access.
    ///
    /// # Errors
    ///
    /// Returns an error when Drive rejects the permission.
    pub async fn share(&self, id: &str) -> ProviderResult<()> {
        let response = self
            .http
            .post(self.api(&format!("files/{id}/permissions")))
            .bearer_auth(&self.access_token)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await
            .map_err(ProviderError::http("drive.share"))?;
        check_status("drive.share", response).await?;
        Ok(())
    }

    /// Browser URL for an object.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup fails or Drive omits the link.
    pub async fn web_view_link(&self, id: &str) -> ProviderResult<String> {
        let response = self
            .http
            .get(self.api(&format!("files/{id}")))
            .bearer_auth(&self.access_token)
            .query(&[("fields", "webViewLink")])
            .send()
            .await
            .map_err(ProviderError::http("drive.view_link"))?;
        let link: ViewLink = check_status("drive.view_link", response)
            .await?
            .json()
            .await
            .map_err(ProviderError::http("drive.view_link"))?;
        link.web_view_link.ok_or_else(|| {
            warn!(file_id = id, "drive returned no view link");
            ProviderError::protocol("drive.view_link", "response carried no webViewLink")
        })
    }
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
