use std::ffi::OsString;

use async_trait::async_trait;
use ferry_core::{
    EndpointKind, Sink, Source, StagedArtifact, TransferContext, TransferError, TransferResult,
};
use tracing::info;

use super::cli::{self, CommandOutcome, ProgressTarget};
use super::{MegaConfig, MegaUrl, parse_export_link};
use crate::error::ProviderError;

/// Downloads any accepted Mega URL shape with `mega-get`.
#[derive(Debug, Clone)]
pub struct MegaSource {
    config: MegaConfig,
}

impl MegaSource {
    /// Source using the given commands.
    #[must_use]
    pub const fn new(config: MegaConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Source for MegaSource {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Mega
    }

    async fn fetch(&self, ctx: &TransferContext) -> TransferResult<StagedArtifact> {
        let url = &ctx.job.source_url;
        let shape = MegaUrl::classify(url).ok_or_else(|| TransferError::unrecognized(url))?;
        let staging = ctx.ensure_staging().await?.to_path_buf();

        let outcome = cli::run(
            "mega.get",
            &self.config.get_bin,
            vec![OsString::from(url), staging.clone().into_os_string()],
            Some(ProgressTarget {
                ctx,
                name: shape.placeholder_name(),
                message: "Transferring from Mega.nz",
            }),
        )
        .await
        .map_err(ProviderError::into_fetch_failure)?;
        check_exit(&self.config, "mega.get", &self.config.get_bin, &outcome, fetch_failed)?;

        let artifact = ferry_staging::single_artifact(&staging).await?;
        info!(job_id = %ctx.job.id, name = %artifact.name, ?shape, "mega fetch finished");
        Ok(artifact)
    }
}

/// Uploads into the configured folder with `mega-put` and exports a public link.
#[derive(Debug, Clone)]
pub struct MegaSink {
    config: MegaConfig,
}

impl MegaSink {
    /// Sink using the given commands.
    #[must_use]
    pub const fn new(config: MegaConfig) -> Self {
        Self { config }
    }

    fn remote_folder(&self) -> String {
        format!("/{}/", self.config.folder_name.trim_matches('/'))
    }
}

#[async_trait]
impl Sink for MegaSink {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Mega
    }

    fn accepts_directories(&self) -> bool {
        true
    }

    async fn publish(
        &self,
        ctx: &TransferContext,
        artifact: &StagedArtifact,
    ) -> TransferResult<String> {
        let folder = self.remote_folder();
        let outcome = cli::run(
            "mega.put",
            &self.config.put_bin,
            vec![
                OsString::from("-c"),
                artifact.path.clone().into_os_string(),
                OsString::from(&folder),
            ],
            Some(ProgressTarget {
                ctx,
                name: &artifact.name,
                message: "Transferring to Mega.nz",
            }),
        )
        .await
        .map_err(ProviderError::into_publish_failure)?;
        check_exit(&self.config, "mega.put", &self.config.put_bin, &outcome, rejected)?;

        let remote = format!("{folder}{}", artifact.name);
        let exported = cli::run(
            "mega.export",
            &self.config.export_bin,
            vec![OsString::from("-a"), OsString::from(&remote)],
            None,
        )
        .await
        .map_err(ProviderError::into_publish_failure)?;
        check_exit(
            &self.config,
            "mega.export",
            &self.config.export_bin,
            &exported,
            rejected,
        )?;
        let link = parse_export_link(&exported.stdout).ok_or_else(|| {
            TransferError::publish("mega.export", format!("no public link for {remote}"))
        })?;
        info!(job_id = %ctx.job.id, link, "mega publish finished");
        Ok(link.to_string())
    }
}

/// Map a non-zero exit through `failure`; the quota exit code short-circuits.
fn check_exit(
    config: &MegaConfig,
    operation: &'static str,
    program: &str,
    outcome: &CommandOutcome,
    failure: fn(&'static str, String) -> TransferError,
) -> TransferResult<()> {
    match outcome.code {
        Some(0) => Ok(()),
        Some(code) if code == config.quota_exit_code => Err(TransferError::QuotaExceeded {
            detail: format!("{program} exited with {code}"),
        }),
        Some(code) => Err(failure(operation, format!("{program} exited with {code}"))),
        None => Err(failure(
            operation,
            format!("{program} was terminated by a signal"),
        )),
    }
}

fn fetch_failed(operation: &'static str, detail: String) -> TransferError {
    TransferError::unreachable(operation, detail)
}

fn rejected(operation: &'static str, detail: String) -> TransferError {
    TransferError::publish(operation, detail)
}
