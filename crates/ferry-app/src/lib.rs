#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Ferry process bootstrap.
//!
//! Layout: `bootstrap.rs` (backend and adapter wiring, role supervision), `error.rs`.

/// Configuration loading, backend selection and role startup.
pub mod bootstrap;
/// Process-level error type.
pub mod error;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
