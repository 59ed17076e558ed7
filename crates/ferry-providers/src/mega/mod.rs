//! Mega adapter driven through the MEGAcmd command-line client.

mod adapters;
mod cli;

use std::sync::LazyLock;

use regex::Regex;

pub use adapters::{MegaSink, MegaSource};

/// Exit status MEGAcmd reports when the transfer quota is exhausted (`-17` as a byte).
pub const DEFAULT_QUOTA_EXIT_CODE: i32 = 239;

/// Command names and upload folder for MEGAcmd.
#[derive(Debug, Clone)]
pub struct MegaConfig {
    /// Download command.
    pub get_bin: String,
    /// Upload command.
    pub put_bin: String,
    /// Export (public link) command.
    pub export_bin: String,
    /// Remote folder receiving uploads.
    pub folder_name: String,
    /// Exit status that signals an exhausted transfer quota.
    pub quota_exit_code: i32,
}

impl Default for MegaConfig {
    fn default() -> Self {
        Self {
            get_bin: "mega-get".into(),
            put_bin: "mega-put".into(),
            export_bin: "mega-export".into(),
            folder_name: "Ferry".into(),
            quota_exit_code: DEFAULT_QUOTA_EXIT_CODE,
        }
    }
}

/// Accepted Mega URL shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MegaUrl {
    /// `https://mega.nz/file/<id>#<key>`
    File,
    /// `https://mega.nz/folder/<id>#<key>`
    Folder,
    /// `https://mega.nz/folder/<id>#<key>/folder/<id>`
    FolderFolder,
    /// `https://mega.nz/folder/<id>#<key>/file/<id>`
    FolderFile,
}

impl MegaUrl {
    /// Classify a URL, or `None` when no accepted shape matches.
    #[must_use]
    pub fn classify(url: &str) -> Option<Self> {
        let matches = |pattern: &LazyLock<Option<Regex>>| {
            pattern.as_ref().is_some_and(|re| re.is_match(url))
        };
        [
            (&FILE_URL, Self::File),
            (&FOLDER_URL, Self::Folder),
            (&FOLDER_FOLDER_URL, Self::FolderFolder),
            (&FOLDER_FILE_URL, Self::FolderFile),
        ]
        .into_iter()
        .find_map(|(pattern, shape)| matches(pattern).then_some(shape))
    }

    /// Placeholder name shown in progress records until the artifact is known.
    #[must_use]
    pub const fn placeholder_name(self) -> &'static str {
        match self {
            Self::File | Self::FolderFile => "tmp.file",
            Self::Folder | Self::FolderFolder => "tmp.folder",
        }
    }
}

static FILE_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^https://mega\.nz/file/[a-zA-Z0-9]{0,8}#[a-zA-Z0-9_-]+$").ok());
static FOLDER_URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^https://mega\.nz/folder/[a-zA-Z0-9]{0,8}#[a-zA-Z0-9_-]+$").ok()
});
static FOLDER_FOLDER_URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^https://mega\.nz/folder/[a-zA-Z0-9]{0,8}#[a-zA-Z0-9_-]+/folder/[a-zA-Z0-9]{0,8}$")
        .ok()
});
static FOLDER_FILE_URL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^https://mega\.nz/folder/[a-zA-Z0-9]{0,8}#[a-zA-Z0-9_-]+/file/[a-zA-Z0-9]{0,8}$")
        .ok()
});
static PROGRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r":\s*([0-9]*\.[0-9]+)\s*%").ok());

/// Extract the transfer percentage from one line of MEGAcmd stderr.
///
/// Lines look like `TRANSFERRING ||####....||(12/345 MB:  3.52 %)`.
#[must_use]
pub fn parse_progress(line: &str) -> Option<u8> {
    let captures = PROGRESS.as_ref()?.captures(line)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    // Truncation is intended: 99.9 % is not done.
    Some(value.min(100.0) as u8)
}

/// Public link printed by `mega-export -a`, the last whitespace-separated token.
#[must_use]
pub fn parse_export_link(stdout: &str) -> Option<&str> {
    stdout
        .split_whitespace()
        .last()
        .filter(|token| token.starts_with("https://mega.nz/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_four_shapes_are_classified() {
        assert_eq!(
            MegaUrl::classify("https://mega.nz/file/AbCd1234#key_-9"),
            Some(MegaUrl::File)
        );
        assert_eq!(
            MegaUrl::classify("https://mega.nz/folder/AbCd1234#key"),
            Some(MegaUrl::Folder)
        );
        assert_eq!(
            MegaUrl::classify("https://mega.nz/folder/AbCd1234#key/folder/XyZ98765"),
            Some(MegaUrl::FolderFolder)
        );
        assert_eq!(
            MegaUrl::classify("https://mega.nz/folder/AbCd1234#key/file/XyZ98765"),
            Some(MegaUrl::FolderFile)
        );
    }

    #[test]
    fn foreign_urls_are_rejected() {
        assert_eq!(MegaUrl::classify("https://example.com/not-mega"), None);
        assert_eq!(MegaUrl::classify("https://mega.nz/file/toolongid123#key"), None);
        assert_eq!(MegaUrl::classify("https://mega.nz/#!legacy!key"), None);
    }

    #[test]
    fn progress_lines_are_parsed() {
        assert_eq!(
            parse_progress("TRANSFERRING ||########......||(12/345 MB:  3.52 %)"),
            Some(3)
        );
        assert_eq!(parse_progress("TRANSFERRING ||####||(345/345 MB: 100.00 %)"), Some(100));
        assert_eq!(parse_progress("Download finished: song.mp3"), None);
        assert_eq!(parse_progress(""), None);
    }

    #[test]
    fn export_link_is_last_token() {
        assert_eq!(
            parse_export_link("Exported /Ferry/song.mp3: https://mega.nz/file/Ab#cd\n"),
            Some("https://mega.nz/file/Ab#cd")
        );
        assert_eq!(parse_export_link("[API:err]: access denied"), None);
        assert_eq!(parse_export_link(""), None);
    }
}
