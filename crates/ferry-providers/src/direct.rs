//! Direct-HTTP origin: a streaming download of any reachable URL.

use async_trait::async_trait;
use ferry_core::{
    EndpointKind, Source, StagedArtifact, TransferContext, TransferError, TransferResult,
};
use futures_util::StreamExt;
use percent_encoding::percent_decode_str;
use reqwest::header::CONTENT_DISPOSITION;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{ProviderError, check_status};
use crate::progress::ByteProgress;

/// Name used when neither the server nor the URL provides one.
pub const FALLBACK_NAME: &str = "tmp.file";
const FETCH_MESSAGE: &str = "Transferring from source";

/// Downloads `http(s)://` URLs into staging.
#[derive(Debug, Clone)]
pub struct DirectSource {
    http: reqwest::Client,
}

impl DirectSource {
    /// Source using a shared HTTP client; redirects follow the client's policy.
    #[must_use]
    pub const fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Source for DirectSource {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Direct
    }

    async fn fetch(&self, ctx: &TransferContext) -> TransferResult<StagedArtifact> {
        let url = &ctx.job.source_url;
        let parsed = reqwest::Url::parse(url).map_err(|_| TransferError::unrecognized(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransferError::unrecognized(url));
        }

        let response = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(ProviderError::http("direct.get"))
            .map_err(ProviderError::into_fetch_failure)?;
        let response = check_status("direct.get", response)
            .await
            .map_err(ProviderError::into_fetch_failure)?;

        let name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition)
            .or_else(|| filename_from_url(response.url()))
            .unwrap_or_else(|| FALLBACK_NAME.to_string());
        let staging = ctx.ensure_staging().await?;
        let destination = staging.join(&name);

        let mut output = tokio::fs::File::create(&destination)
            .await
            .map_err(|err| TransferError::staging_io("direct.create", &destination, err))?;
        let mut progress = ByteProgress::new(response.content_length());
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(ProviderError::http("direct.read"))
                .map_err(ProviderError::into_fetch_failure)?;
            output
                .write_all(&chunk)
                .await
                .map_err(|err| TransferError::staging_io("direct.write", &destination, err))?;
            if let Some(percentage) = progress.advance(chunk.len() as u64) {
                ctx.report(&name, FETCH_MESSAGE, percentage).await;
            }
        }
        output
            .flush()
            .await
            .map_err(|err| TransferError::staging_io("direct.flush", &destination, err))?;
        drop(output);

        info!(job_id = %ctx.job.id, name = %name, bytes = progress.done(), "direct fetch finished");
        Ok(ferry_staging::inspect(&destination).await?)
    }
}

/// File name from a `Content-Disposition` header, preferring the RFC 5987 form.
#[must_use]
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';').map(str::trim) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.trim().trim_matches('"');
                let encoded = encoded.split_once("''").map_or(encoded, |(_, rest)| rest);
                if let Some(name) = sanitize(&percent_decode_str(encoded).decode_utf8_lossy()) {
                    return Some(name);
                }
            }
            "filename" => plain = sanitize(value.trim().trim_matches('"')),
            _ => {}
        }
    }
    plain
}

/// File name from the last path segment of the final (post-redirect) URL.
#[must_use]
pub fn filename_from_url(url: &reqwest::Url) -> Option<String> {
    let segment = url.path_segments()?.rfind(|segment| !segment.is_empty())?;
    sanitize(&percent_decode_str(segment).decode_utf8_lossy())
}

/// Strip query suffixes and path separators so the name stays inside staging.
fn sanitize(raw: &str) -> Option<String> {
    let name = raw.split('?').next().unwrap_or_default();
    let name = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name.replace('\0', "_")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_prefers_extended_form() {
        assert_eq!(
            filename_from_disposition(
                "attachment; filename=\"fallback.bin\"; filename*=UTF-8''na%C3%AFve%20file.txt"
            ),
            Some("naïve file.txt".into())
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=\"report.pdf\""),
            Some("report.pdf".into())
        );
        assert_eq!(filename_from_disposition("inline"), None);
    }

    #[test]
    fn names_are_sanitised() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"../../etc/passwd\""),
            Some("passwd".into())
        );
        assert_eq!(
            filename_from_disposition("attachment; filename=\"archive.zip?token=abc\""),
            Some("archive.zip".into())
        );
        assert_eq!(filename_from_disposition("attachment; filename=\"..\""), None);
    }

    #[test]
    fn url_fallback_uses_last_segment() -> anyhow::Result<()> {
        let url = reqwest::Url::parse("https://cdn.example.com/files/My%20Movie.mkv?sig=1")?;
        assert_eq!(filename_from_url(&url), Some("My Movie.mkv".into()));
        let root = reqwest::Url::parse("https://cdn.example.com/")?;
        assert_eq!(filename_from_url(&root), None);
        Ok(())
    }
}
