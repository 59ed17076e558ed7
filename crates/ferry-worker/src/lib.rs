#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Worker runtime: executes queued transfers and handles removal requests.
//!
//! Layout: `routes.rs` (static adapter table), `worker.rs` (per-job state machine),
//! `runner.rs` (queue loop), `progress.rs` (store-backed reporter), `notify.rs`
//! (owner push), `janitor.rs` (removal handler), `error.rs`.

pub mod error;
pub mod janitor;
pub mod notify;
pub mod progress;
pub mod routes;
pub mod runner;
pub mod worker;

pub use error::{NotifyError, NotifyResult, WorkerError, WorkerResult};
pub use janitor::{Removal, RemovalHandler};
pub use notify::{FcmCredentials, FcmNotifier, LogNotifier, Notifier, PushMessage};
pub use progress::StoreProgress;
pub use routes::{RoutePair, RouteTable};
pub use runner::{LoopExit, WorkerLoop};
pub use worker::{JobOutcome, TransferWorker, WorkerDeps, milestone};
