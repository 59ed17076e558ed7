//! `GET /api/file/{file_id}`: streams a direct-link file from this host.

use std::io::ErrorKind;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

use crate::problem::ApiError;
use crate::state::ApiState;

const EXPIRED_DETAIL: &str = "file link is unknown or expired";

pub(crate) async fn download(
    State(state): State<Arc<ApiState>>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state
        .registry
        .resolve(&file_id)
        .await
        .map_err(|err| {
            error!(error = %err, %file_id, "direct-link lookup failed");
            ApiError::internal("direct-link lookup failed")
        })?
        .ok_or_else(|| ApiError::not_found(EXPIRED_DETAIL))?;

    let file = match tokio::fs::File::open(&record.file_path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(%file_id, path = %record.file_path.display(), "direct-link file is gone");
            return Err(ApiError::not_found(EXPIRED_DETAIL));
        }
        Err(err) => {
            error!(error = %err, %file_id, "direct-link file could not be opened");
            return Err(ApiError::internal("file could not be opened"));
        }
    };
    let length = file.metadata().await.map(|metadata| metadata.len()).ok();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &record.mime_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(&record.name));
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }
    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|err| {
            error!(error = %err, %file_id, "failed to build download response");
            ApiError::internal("failed to build download response")
        })
}

/// `attachment` disposition with an ASCII fallback and the exact UTF-8 name.
pub(crate) fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|ch| {
            if (ch.is_ascii_graphic() && ch != '"' && ch != '\\') || ch == ' ' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        utf8_percent_encode(name, NON_ALPHANUMERIC)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispositions_keep_ascii_names_readable() {
        assert_eq!(
            content_disposition("clip 1.mp4"),
            "attachment; filename=\"clip 1.mp4\"; filename*=UTF-8''clip%201%2Emp4"
        );
        let encoded = content_disposition("résumé \"v2\".pdf");
        assert!(encoded.starts_with("attachment; filename=\"r_sum_ _v2_.pdf\""));
        assert!(encoded.contains("r%C3%A9sum%C3%A9"));
    }
}
