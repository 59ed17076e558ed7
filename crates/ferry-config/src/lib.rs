#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Environment-driven configuration with defaults and validation.
//!
//! Layout: `model.rs` (typed sections), `loader.rs` (variable lookup and parsing),
//! `defaults.rs` (default values), `error.rs`.

mod defaults;
pub mod error;
pub mod loader;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use loader::ENV_PREFIX;
pub use model::{
    AppConfig, AppMode, FcmConfig, FerryConfig, GDriveSettings, LinksConfig, MegaSettings,
    QueueConfig, StagingConfig, TorrentSettings,
};
