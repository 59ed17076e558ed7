#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Local staging area shared by every transfer adapter.
//!
//! Layout: `manager.rs` (per-job directories and cleanup), `inspect.rs` (artifact
//! description and MIME lookup), `archive.rs` (directory zipping and relocation),
//! `error.rs`.

pub mod archive;
pub mod error;
pub mod inspect;
pub mod manager;

pub use archive::{ARCHIVE_MIME, relocate, zip_directory};
pub use error::{StagingError, StagingResult};
pub use inspect::{
    DEFAULT_MIME, DIRECTORY_MIME, aggregate_size, inspect, mime_for_path, single_artifact,
};
pub use manager::{JOB_DIR_PREFIX, StagingDir, StagingManager};
