//! Owner push notifications.

use async_trait::async_trait;
use ferry_core::OwnerId;
use ferry_store::TransferStore;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{NotifyError, NotifyResult};

const CANCELLED_TEXT: &str = "cancelled by user";

/// Push payload sent to a job's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// Visible notification for a finished transfer.
    Completed {
        /// Artifact name.
        title: String,
        /// Destination URL.
        body: String,
    },
    /// Data-only message for a failed job.
    Failed {
        /// Source URL of the job.
        job: String,
        /// Error text.
        error: String,
    },
    /// Data-only message for a job cancelled by its owner.
    Cancelled {
        /// Source URL of the job.
        job: String,
    },
}

impl PushMessage {
    /// FCM v1 `message` object addressed to `token`.
    #[must_use]
    pub fn to_fcm(&self, token: &str) -> Value {
        match self {
            Self::Completed { title, body } => json!({
                "token": token,
                "notification": { "title": title, "body": body },
            }),
            Self::Failed { job, error } => json!({
                "token": token,
                "data": { "job": job, "error": error },
            }),
            Self::Cancelled { job } => json!({
                "token": token,
                "data": { "job": job, "error": CANCELLED_TEXT, "cancelled": "true" },
            }),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Delivers push messages to every device registered by an owner.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `message` to `owner_id`.
    async fn notify(&self, owner_id: &OwnerId, message: PushMessage) -> NotifyResult<()>;
}

/// Notifier used when push delivery is not configured; it only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, owner_id: &OwnerId, message: PushMessage) -> NotifyResult<()> {
        info!(%owner_id, kind = message.label(), "push delivery disabled; notification skipped");
        Ok(())
    }
}

/// FCM v1 project credentials.
#[derive(Debug, Clone)]
pub struct FcmCredentials {
    /// API base URL.
    pub endpoint: String,
    /// Firebase project identifier.
    pub project_id: String,
    /// OAuth bearer token.
    pub access_token: String,
}

/// Sends through the FCM v1 HTTP API to the tokens stored under `fcmKeys/{owner}`.
pub struct FcmNotifier {
    http: reqwest::Client,
    store: TransferStore,
    credentials: FcmCredentials,
}

impl FcmNotifier {
    /// Notifier for one Firebase project.
    #[must_use]
    pub const fn new(
        http: reqwest::Client,
        store: TransferStore,
        credentials: FcmCredentials,
    ) -> Self {
        Self {
            http,
            store,
            credentials,
        }
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.credentials.endpoint.trim_end_matches('/'),
            self.credentials.project_id
        )
    }

    async fn send_one(&self, url: &str, message: Value) -> NotifyResult<()> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.credentials.access_token)
            .json(&json!({ "message": message }))
            .send()
            .await
            .map_err(|source| NotifyError::Request { source })?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            detail: detail.chars().take(256).collect(),
        })
    }
}

#[async_trait]
impl Notifier for FcmNotifier {
    /// Tries every token; the last failure is returned once all were attempted.
    async fn notify(&self, owner_id: &OwnerId, message: PushMessage) -> NotifyResult<()> {
        let tokens = self
            .store
            .fcm_tokens(owner_id)
            .await
            .map_err(|source| NotifyError::Tokens { source })?;
        if tokens.is_empty() {
            debug!(%owner_id, "owner has no push tokens");
            return Ok(());
        }
        let url = self.send_url();
        let mut outcome = Ok(());
        for token in &tokens {
            if let Err(error) = self.send_one(&url, message.to_fcm(token)).await {
                warn!(%owner_id, %error, "push delivery failed for one token");
                outcome = Err(error);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_store::MemoryStore;
    use httpmock::prelude::*;
    use std::sync::Arc;

    fn notifier(server: &MockServer, store: TransferStore) -> FcmNotifier {
        FcmNotifier::new(
            reqwest::Client::new(),
            store,
            FcmCredentials {
                endpoint: server.base_url(),
                project_id: "ferry-test".into(),
                access_token: "bearer-1".into(),
            },
        )
    }

    #[test]
    fn cancellation_payload_is_distinct() {
        let failed = PushMessage::Failed {
            job: "https://example.com/not-mega".into(),
            error: "unrecognized url: https://example.com/not-mega".into(),
        }
        .to_fcm("t1");
        assert_eq!(failed["data"]["job"], "https://example.com/not-mega");
        assert!(failed["data"].get("cancelled").is_none());

        let cancelled = PushMessage::Cancelled {
            job: "https://mega.nz/file/x#k".into(),
        }
        .to_fcm("t1");
        assert_eq!(cancelled["data"]["error"], "cancelled by user");
        assert_eq!(cancelled["data"]["cancelled"], "true");
        assert!(cancelled.get("notification").is_none());
    }

    #[tokio::test]
    async fn completed_messages_reach_every_token() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/projects/ferry-test/messages:send")
                .header("authorization", "Bearer bearer-1")
                .body_includes("\"title\":\"clip.mp4\"");
            then.status(200).json_body(json!({ "name": "projects/ferry-test/messages/1" }));
        });

        let store = TransferStore::new(Arc::new(MemoryStore::new()));
        let owner = OwnerId::from("uid");
        store.add_fcm_token(&owner, "device-a").await?;
        store.add_fcm_token(&owner, "device-b").await?;

        notifier(&server, store)
            .notify(
                &owner,
                PushMessage::Completed {
                    title: "clip.mp4".into(),
                    body: "https://mega.nz/file/Ab#k".into(),
                },
            )
            .await?;
        mock.assert_hits(2);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_messages_surface_the_status() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST);
            then.status(401).body("token expired");
        });
        let store = TransferStore::new(Arc::new(MemoryStore::new()));
        let owner = OwnerId::from("uid");
        store.add_fcm_token(&owner, "device-a").await?;

        let err = notifier(&server, store)
            .notify(
                &owner,
                PushMessage::Cancelled {
                    job: "magnet:?xt=urn:btih:abc".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { status: 401, ref detail } if detail == "token expired"));
        Ok(())
    }

    #[tokio::test]
    async fn owners_without_tokens_are_skipped() -> anyhow::Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(200);
        });
        let store = TransferStore::new(Arc::new(MemoryStore::new()));
        notifier(&server, store)
            .notify(
                &OwnerId::from("nobody"),
                PushMessage::Failed {
                    job: "https://host/file".into(),
                    error: "boom".into(),
                },
            )
            .await?;
        mock.assert_hits(0);
        Ok(())
    }
}
