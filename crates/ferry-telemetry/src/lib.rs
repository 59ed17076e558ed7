#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Logging, span context and metrics shared by every ferry process.
//!
//! Layout: `init.rs` (subscriber installation, build SHA), `context.rs` (process span
//! guard), `layers.rs` (request-id middleware), `metrics.rs` (Prometheus registry),
//! `error.rs`.

pub mod context;
pub mod error;
pub mod init;
pub mod layers;
pub mod metrics;

pub use context::{GlobalContextGuard, record_app_mode};
pub use error::{TelemetryError, TelemetryResult};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use layers::{propagate_request_id_layer, set_request_id_layer};
pub use metrics::{Metrics, MetricsSnapshot, Outcome};
