#![forbid(unsafe_code)]
#![deny(unused_must_use, missing_docs)]

//! Binary entrypoint that loads configuration and runs the roles selected by
//! `FERRY_MODE` until shutdown or an owner cancellation.

use ferry_app::{AppResult, run_app};

/// Bootstraps ferry and blocks until every role has stopped.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
