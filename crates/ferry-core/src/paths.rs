//! Document store layout.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{JobId, JobKey, OwnerId};

/// Root for transient progress records.
pub const TRANSFERRING: &str = "transferring";
/// Root for permanent transfer records.
pub const TRANSFERS: &str = "transfers";
/// Root for transfer cancellation/removal signals.
pub const REMOVE_TRANSFERS: &str = "removeTransfers";
/// Root for torrent cancellation signals.
pub const REMOVE_TORRENTS: &str = "removeTorrents";
/// Root for torrent statistics.
pub const TORRENTS: &str = "torrents";
/// Root for direct-link registry entries.
pub const DIRECT_LINKS: &str = "directLinks";
/// Root for host registrations.
pub const DNS: &str = "dns";
/// Root for push-notification tokens.
pub const FCM_KEYS: &str = "fcmKeys";
/// Root for stored cloud-drive credentials.
pub const TOKENS: &str = "tokens";

/// Slash-separated document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocPath(String);

impl DocPath {
    /// Path consisting of a single root segment.
    #[must_use]
    pub fn root(segment: &str) -> Self {
        Self(segment.trim_matches('/').to_string())
    }

    /// Parse a raw path, normalising leading and trailing separators.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim_matches('/').to_string())
    }

    /// Append one segment.
    #[must_use]
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let segment = segment.as_ref().trim_matches('/');
        if self.0.is_empty() {
            Self(segment.to_string())
        } else {
            Self(format!("{}/{segment}", self.0))
        }
    }

    /// Parent path, or `None` for a root segment.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// Iterate over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Final segment.
    #[must_use]
    pub fn last(&self) -> &str {
        self.segments().last().unwrap_or_default()
    }

    /// Whether `self` equals `ancestor` or lies below it.
    #[must_use]
    pub fn starts_with(&self, ancestor: &Self) -> bool {
        self.0 == ancestor.0
            || (self.0.starts_with(&ancestor.0)
                && self.0.as_bytes().get(ancestor.0.len()) == Some(&b'/'))
    }

    /// Borrow the raw path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `transferring/{owner}/{route}/{job}`.
    #[must_use]
    pub fn transferring(key: &JobKey) -> Self {
        Self::keyed(TRANSFERRING, key)
    }

    /// `transfers/{owner}/{route}/{job}`.
    #[must_use]
    pub fn transfers(key: &JobKey) -> Self {
        Self::keyed(TRANSFERS, key)
    }

    /// `removeTransfers/{owner}/{route}/{job}`.
    #[must_use]
    pub fn remove_transfers(key: &JobKey) -> Self {
        Self::keyed(REMOVE_TRANSFERS, key)
    }

    /// `removeTorrents/{owner}/{route}/{job}`.
    #[must_use]
    pub fn remove_torrents(key: &JobKey) -> Self {
        Self::keyed(REMOVE_TORRENTS, key)
    }

    /// `torrents/{owner}/{route}/{job}`.
    #[must_use]
    pub fn torrents(key: &JobKey) -> Self {
        Self::keyed(TORRENTS, key)
    }

    /// `directLinks/{fileID}`.
    #[must_use]
    pub fn direct_link(file_id: &str) -> Self {
        Self::root(DIRECT_LINKS).child(file_id)
    }

    /// `fcmKeys/{owner}`.
    #[must_use]
    pub fn fcm_keys(owner_id: &OwnerId) -> Self {
        Self::root(FCM_KEYS).child(owner_id.as_str())
    }

    /// `tokens/{owner}/refreshToken`.
    #[must_use]
    pub fn refresh_token(owner_id: &OwnerId) -> Self {
        Self::root(TOKENS).child(owner_id.as_str()).child("refreshToken")
    }

    /// Recover the job triple from a keyed path such as `removeTransfers/{owner}/{route}/{job}`.
    #[must_use]
    pub fn job_key(&self) -> Option<JobKey> {
        let mut segments = self.segments();
        let _root = segments.next()?;
        let owner = segments.next()?;
        let route = segments.next()?.parse().ok()?;
        let job = Uuid::parse_str(segments.next()?).ok()?;
        if segments.next().is_some() {
            return None;
        }
        Some(JobKey {
            owner_id: OwnerId::from(owner),
            route,
            job_id: JobId(job),
        })
    }

    fn keyed(root: &str, key: &JobKey) -> Self {
        Self::root(root)
            .child(key.owner_id.as_str())
            .child(key.route.name())
            .child(key.job_id.to_string())
    }
}

impl Display for DocPath {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Route;

    fn key() -> JobKey {
        JobKey {
            owner_id: OwnerId::from("uid-7"),
            route: Route::MegaToDirect,
            job_id: JobId(Uuid::nil()),
        }
    }

    #[test]
    fn keyed_paths_follow_store_layout() {
        let key = key();
        assert_eq!(
            DocPath::transferring(&key).as_str(),
            "transferring/uid-7/mega-to-direct/00000000-0000-0000-0000-000000000000"
        );
        assert!(DocPath::remove_torrents(&key).as_str().starts_with("removeTorrents/uid-7/"));
        assert_eq!(
            DocPath::refresh_token(&key.owner_id).as_str(),
            "tokens/uid-7/refreshToken"
        );
        assert_eq!(DocPath::direct_link("abc").as_str(), "directLinks/abc");
    }

    #[test]
    fn job_key_round_trips_through_path() {
        let key = key();
        assert_eq!(DocPath::remove_transfers(&key).job_key(), Some(key));
        assert_eq!(DocPath::parse("removeTransfers/uid/bogus/x").job_key(), None);
        assert_eq!(DocPath::root(FCM_KEYS).job_key(), None);
    }

    #[test]
    fn ancestry_respects_segment_boundaries() {
        let parent = DocPath::parse("transfers/uid");
        assert!(DocPath::parse("transfers/uid/route").starts_with(&parent));
        assert!(DocPath::parse("transfers/uid").starts_with(&parent));
        assert!(!DocPath::parse("transfers/uid2/route").starts_with(&parent));
        assert_eq!(
            DocPath::parse("/a/b/").parent(),
            Some(DocPath::parse("a"))
        );
        assert_eq!(DocPath::parse("a/b").last(), "b");
    }
}
