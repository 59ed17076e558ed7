//! Fixed set of transfer routes and the endpoint classes they connect.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Class of storage endpoint a transfer reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Cloud-drive account (Google Drive).
    GDrive,
    /// Mega-like consumer cloud storage.
    Mega,
    /// Plain HTTP link; a source when fetching, a served file when publishing.
    Direct,
    /// BitTorrent/WebTorrent swarm.
    Torrents,
}

impl EndpointKind {
    /// Segment used when composing route names.
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::GDrive => "gdrive",
            Self::Mega => "mega",
            Self::Direct => "direct",
            Self::Torrents => "torrents",
        }
    }

    /// Field name used for this endpoint inside a transfer record.
    #[must_use]
    pub const fn record_field(self) -> &'static str {
        match self {
            Self::GDrive => "gDriveLink",
            Self::Mega => "megaLink",
            Self::Direct => "directLink",
            Self::Torrents => "magnetLink",
        }
    }
}

/// Ordered (source, destination) pair naming the adapter pair a job uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Route {
    /// Cloud drive to Mega-like storage.
    #[serde(rename = "gdrive-to-mega")]
    GDriveToMega,
    /// Mega-like storage to cloud drive.
    #[serde(rename = "mega-to-gdrive")]
    MegaToGDrive,
    /// Direct HTTP link to cloud drive.
    #[serde(rename = "direct-to-gdrive")]
    DirectToGDrive,
    /// Direct HTTP link to Mega-like storage.
    #[serde(rename = "direct-to-mega")]
    DirectToMega,
    /// Cloud drive to a direct link served by this system.
    #[serde(rename = "gdrive-to-direct")]
    GDriveToDirect,
    /// Mega-like storage to a direct link served by this system.
    #[serde(rename = "mega-to-direct")]
    MegaToDirect,
    /// Torrent swarm to cloud drive.
    #[serde(rename = "torrents-to-gdrive")]
    TorrentsToGDrive,
    /// Torrent swarm to Mega-like storage.
    #[serde(rename = "torrents-to-mega")]
    TorrentsToMega,
    /// Torrent swarm to a direct link served by this system.
    #[serde(rename = "torrents-to-direct")]
    TorrentsToDirect,
}

impl Route {
    /// Every supported route, in a stable order.
    pub const ALL: [Self; 9] = [
        Self::GDriveToMega,
        Self::MegaToGDrive,
        Self::DirectToGDrive,
        Self::DirectToMega,
        Self::GDriveToDirect,
        Self::MegaToDirect,
        Self::TorrentsToGDrive,
        Self::TorrentsToMega,
        Self::TorrentsToDirect,
    ];

    /// Queue route name, also used as the document-store path segment.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GDriveToMega => "gdrive-to-mega",
            Self::MegaToGDrive => "mega-to-gdrive",
            Self::DirectToGDrive => "direct-to-gdrive",
            Self::DirectToMega => "direct-to-mega",
            Self::GDriveToDirect => "gdrive-to-direct",
            Self::MegaToDirect => "mega-to-direct",
            Self::TorrentsToGDrive => "torrents-to-gdrive",
            Self::TorrentsToMega => "torrents-to-mega",
            Self::TorrentsToDirect => "torrents-to-direct",
        }
    }

    /// Endpoint class the artifact is fetched from.
    #[must_use]
    pub const fn source(self) -> EndpointKind {
        match self {
            Self::GDriveToMega | Self::GDriveToDirect => EndpointKind::GDrive,
            Self::MegaToGDrive | Self::MegaToDirect => EndpointKind::Mega,
            Self::DirectToGDrive | Self::DirectToMega => EndpointKind::Direct,
            Self::TorrentsToGDrive | Self::TorrentsToMega | Self::TorrentsToDirect => {
                EndpointKind::Torrents
            }
        }
    }

    /// Endpoint class the artifact is published to.
    #[must_use]
    pub const fn destination(self) -> EndpointKind {
        match self {
            Self::MegaToGDrive | Self::DirectToGDrive | Self::TorrentsToGDrive => {
                EndpointKind::GDrive
            }
            Self::GDriveToMega | Self::DirectToMega | Self::TorrentsToMega => EndpointKind::Mega,
            Self::GDriveToDirect | Self::MegaToDirect | Self::TorrentsToDirect => {
                EndpointKind::Direct
            }
        }
    }

    /// Whether the route ingests from the torrent swarm.
    #[must_use]
    pub const fn is_torrent(self) -> bool {
        matches!(self.source(), EndpointKind::Torrents)
    }

    /// Whether the route ends in a direct link served by this system.
    #[must_use]
    pub const fn is_direct_link(self) -> bool {
        matches!(self.destination(), EndpointKind::Direct)
    }

    /// Routes consumed by general-purpose workers.
    #[must_use]
    pub fn standard() -> Vec<Self> {
        Self::ALL.into_iter().filter(|route| !route.is_torrent()).collect()
    }

    /// Routes consumed by the torrent worker.
    #[must_use]
    pub fn torrents() -> Vec<Self> {
        Self::ALL.into_iter().filter(|route| route.is_torrent()).collect()
    }
}

impl Display for Route {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Error returned when a route name is not part of the fixed route table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown transfer route")]
pub struct UnknownRoute {
    /// Offending route name.
    pub name: String,
}

impl FromStr for Route {
    type Err = UnknownRoute;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|route| route.name() == value)
            .ok_or_else(|| UnknownRoute {
                name: value.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for route in Route::ALL {
            assert_eq!(route.name().parse::<Route>(), Ok(route));
            assert_eq!(
                route.name(),
                format!(
                    "{}-to-{}",
                    route.source().segment(),
                    route.destination().segment()
                )
            );
        }
    }

    #[test]
    fn unknown_route_is_rejected() {
        let err = "direct-to-direct".parse::<Route>().unwrap_err();
        assert_eq!(err.name, "direct-to-direct");
    }

    #[test]
    fn source_never_equals_destination() {
        for route in Route::ALL {
            assert_ne!(route.source(), route.destination());
        }
    }

    #[test]
    fn worker_partitions_cover_every_route() {
        let mut all = Route::standard();
        all.extend(Route::torrents());
        all.sort();
        let mut expected = Route::ALL.to_vec();
        expected.sort();
        assert_eq!(all, expected);
        assert_eq!(Route::torrents().len(), 3);
    }

    #[test]
    fn serde_uses_route_names() {
        let encoded = serde_json::to_string(&Route::TorrentsToDirect).unwrap();
        assert_eq!(encoded, "\"torrents-to-direct\"");
        let decoded: Route = serde_json::from_str("\"mega-to-gdrive\"").unwrap();
        assert_eq!(decoded, Route::MegaToGDrive);
    }
}
