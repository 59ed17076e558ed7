#![forbid(unsafe_code)]
#![deny(unused_must_use, missing_docs)]

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (jobs, scripted adapters, progress recorder), postgres.rs (disposable databases).

pub mod fixtures;
pub mod postgres;
