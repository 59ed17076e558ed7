#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]
#![allow(clippy::module_name_repetitions)]

//! HTTP surface: streams direct-link files and exposes health and metrics.
//!
//! Layout: `router.rs` (server host), `files.rs` (file retrieval), `health.rs`,
//! `telemetry.rs` (request metrics), `problem.rs` (error responses), `error.rs`.

pub mod error;
mod files;
mod health;
mod problem;
mod router;
mod state;
mod telemetry;

pub use error::{ApiServerError, ApiServerResult};
pub use router::ApiServer;
