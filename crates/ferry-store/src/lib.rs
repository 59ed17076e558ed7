#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Shared document store for progress records, transfer history and cancellation signals.
//!
//! Layout: `document.rs` (backend contract + watches), `memory.rs` (in-process backend),
//! `postgres.rs` (`ferry_documents` table + LISTEN/NOTIFY), `transfers.rs` (typed facade),
//! `error.rs`.

pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod transfers;

pub use document::{ChangeKind, DocumentChange, DocumentStore, DocumentWatch};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::{DOCUMENTS_CHANNEL, PgDocumentStore, run_migrations};
pub use transfers::{CancellationWatch, TransferStore};
