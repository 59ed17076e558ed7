//! File identifiers, direct-link records and public URL construction.

use std::net::IpAddr;
use std::sync::Arc;

use ferry_core::{DirectLinkRecord, Job, OwnerId, Route, StagedArtifact};
use ferry_store::TransferStore;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::LinkResult;
use crate::ip::PublicIpResolver;

/// Path prefix of the file retrieval endpoint.
pub const FILE_ROUTE_PREFIX: &str = "/api/file/";

/// Stable identifier for a job's served file.
///
/// Derived from `(owner, route, job name)` so re-registering the same job yields
/// the same identifier.
#[must_use]
pub fn file_id(owner_id: &OwnerId, route: Route, job_name: &str) -> String {
    let digest = Sha256::digest(format!("{owner_id}/{route}/{job_name}").as_bytes());
    hex::encode(digest)
}

/// Extract the file identifier from a direct-link URL.
#[must_use]
pub fn file_id_from_url(url: &str) -> Option<&str> {
    let (_, tail) = url.split_once(FILE_ROUTE_PREFIX)?;
    let id = tail.split(['?', '#', '/']).next()?;
    (!id.is_empty()).then_some(id)
}

/// Maps file identifiers to their serving host and on-disk path.
#[derive(Clone)]
pub struct DirectLinkRegistry {
    store: TransferStore,
    resolver: Arc<dyn PublicIpResolver>,
    default_host: String,
    host: Arc<OnceCell<String>>,
}

impl DirectLinkRegistry {
    /// Build a registry; `default_host` is used until this host has a DNS entry.
    #[must_use]
    pub fn new(
        store: TransferStore,
        resolver: Arc<dyn PublicIpResolver>,
        default_host: impl Into<String>,
    ) -> Self {
        Self {
            store,
            resolver,
            default_host: default_host.into(),
            host: Arc::new(OnceCell::new()),
        }
    }

    /// Record the served artifact and return its public URL.
    ///
    /// `artifact.path` must already point at the file's serving location.
    ///
    /// # Errors
    ///
    /// Returns an error when the record cannot be stored or the public IP cannot
    /// be discovered.
    pub async fn register(&self, job: &Job, artifact: &StagedArtifact) -> LinkResult<String> {
        let id = file_id(&job.owner_id, job.route, &job.name);
        let host = self.host().await?.to_string();
        let record = DirectLinkRecord {
            name: artifact.name.clone(),
            mime_type: artifact.mime_type.clone(),
            size: artifact.size_bytes,
            file_path: artifact.path.clone(),
            host,
        };
        self.store.put_direct_link(&id, &record).await?;
        let url = self.url_for(&id).await?;
        info!(job_id = %job.id, file_id = %id, %url, "direct link registered");
        Ok(url)
    }

    /// Look up a file identifier. `None` means unknown or already removed.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    pub async fn resolve(&self, file_id: &str) -> LinkResult<Option<DirectLinkRecord>> {
        Ok(self.store.direct_link(file_id).await?)
    }

    /// Delete a direct-link record.
    ///
    /// # Errors
    ///
    /// Returns an error when the store rejects the delete.
    pub async fn remove(&self, file_id: &str) -> LinkResult<()> {
        self.store.remove_direct_link(file_id).await?;
        debug!(file_id, "direct link removed");
        Ok(())
    }

    /// Public URL for a file identifier served from this host.
    ///
    /// # Errors
    ///
    /// Returns an error when host discovery fails.
    pub async fn url_for(&self, file_id: &str) -> LinkResult<String> {
        let host = self.host().await?;
        Ok(format!("https://{host}{FILE_ROUTE_PREFIX}{file_id}"))
    }

    /// Host name other clients should use to reach this host.
    ///
    /// Resolved once per registry; falls back to the default host when no DNS
    /// record matches the public IP.
    ///
    /// # Errors
    ///
    /// Returns an error when IP discovery or the DNS lookup fails.
    pub async fn host(&self) -> LinkResult<&str> {
        let host = self
            .host
            .get_or_try_init(|| async {
                let ip = self.resolver.public_ip().await?;
                self.host_for_ip(ip).await
            })
            .await?;
        Ok(host.as_str())
    }

    async fn host_for_ip(&self, ip: IpAddr) -> LinkResult<String> {
        let records = self.store.dns_records().await?;
        let matched = records.into_iter().find(|record| {
            record
                .ip
                .parse::<IpAddr>()
                .is_ok_and(|candidate| candidate == ip)
        });
        match matched {
            Some(record) => {
                debug!(%ip, host = %record.name, "dns record matched");
                Ok(record.name)
            }
            None => {
                warn!(%ip, host = %self.default_host, "no dns record for public ip, using default host");
                Ok(self.default_host.clone())
            }
        }
    }
}
