#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Lease-based job queue decoupling request intake from transfer execution.
//!
//! Layout: `queue.rs` (contract), `memory.rs` (in-process backend), `postgres.rs`
//! (`ferry_jobs` table), `error.rs`.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use memory::{JobStatus, MemoryQueue};
pub use postgres::PgJobQueue;
pub use queue::JobQueue;
