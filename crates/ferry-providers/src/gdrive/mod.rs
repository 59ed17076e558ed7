//! Cloud-drive adapter over the Drive v3 REST API.

mod client;
mod sink;
mod source;

use std::sync::LazyLock;

use regex::Regex;

pub use client::{DriveClient, DriveFile, DriveSession, FOLDER_MIME};
pub use sink::GDriveSink;
pub use source::GDriveSource;

/// Endpoints and credentials for the Drive API.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Well-known folder receiving uploads.
    pub folder_name: String,
    /// Metadata API base, e.g. `https://www.googleapis.com/drive/v3`.
    pub api_base: String,
    /// Upload API base, e.g. `https://www.googleapis.com/upload/drive/v3`.
    pub upload_base: String,
    /// OAuth token endpoint.
    pub token_url: String,
}

static FILE_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^https://drive\.google\.com/file/d/([^/?#]+)").ok());
static FOLDER_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^https://drive\.google\.com/drive/folders/([^/?#]+)").ok());

/// Object a cloud-drive URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveTarget {
    /// Single file id.
    File(String),
    /// Folder id.
    Folder(String),
}

impl DriveTarget {
    /// Classify a share URL, or `None` when neither accepted shape matches.
    #[must_use]
    pub fn parse(url: &str) -> Option<Self> {
        let capture = |pattern: &LazyLock<Option<Regex>>| {
            pattern
                .as_ref()
                .and_then(|re| re.captures(url))
                .and_then(|caps| caps.get(1))
                .map(|id| id.as_str().to_string())
        };
        capture(&FILE_URL)
            .map(Self::File)
            .or_else(|| capture(&FOLDER_URL).map(Self::Folder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_share_shapes_are_recognised() {
        assert_eq!(
            DriveTarget::parse("https://drive.google.com/file/d/1AbC_d-9/view?usp=sharing"),
            Some(DriveTarget::File("1AbC_d-9".into()))
        );
        assert_eq!(
            DriveTarget::parse("https://drive.google.com/drive/folders/0Bxyz?usp=share_link"),
            Some(DriveTarget::Folder("0Bxyz".into()))
        );
        assert_eq!(DriveTarget::parse("https://example.com/file/d/abc"), None);
        assert_eq!(DriveTarget::parse("https://mega.nz/file/abc#def"), None);
    }
}
