#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Direct-link registry: files staged on one host, downloadable through any host.
//!
//! Layout: `registry.rs` (file ids, records, URL construction), `ip.rs` (public IP
//! discovery), `error.rs`.

pub mod error;
pub mod ip;
pub mod registry;

pub use error::{LinkError, LinkResult};
pub use ip::{DEFAULT_IP_LOOKUP_URL, IpifyResolver, PublicIpResolver, StaticIpResolver};
pub use registry::{DirectLinkRegistry, FILE_ROUTE_PREFIX, file_id, file_id_from_url};
