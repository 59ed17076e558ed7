#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Endpoint-agnostic transfer interfaces and DTOs.
//!
//! Layout: `route.rs` (route table keys), `model.rs` (jobs, artifacts, records),
//! `paths.rs` (document store layout), `service.rs` (`Source`/`Sink` capabilities),
//! `error.rs` (job-level failure taxonomy).

pub mod error;
pub mod model;
pub mod paths;
pub mod route;
pub mod service;

pub use error::{TransferError, TransferResult};
pub use model::{
    DirectLinkRecord, DnsRecord, Job, JobId, JobKey, JobPayload, JobRequest, OwnerId,
    ProgressRecord, StagedArtifact, TorrentStats, TransferRecord, job_name,
};
pub use paths::DocPath;
pub use route::{EndpointKind, Route, UnknownRoute};
pub use service::{ProgressReporter, Sink, Source, TransferContext};
