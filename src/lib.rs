//! This crate provides an ensemble summary service for epidemic simulations. An ensemble is a
//! labelled n-dimensional array of simulation output, typically with `time`, `state` and
//! `replicate` axes. The service computes grouped sums, generic associative reductions, exact
//! quantiles, prediction intervals, and between- and within-simulation quantile summaries.
//!
//! Large ensembles may be split into replicate chunks. Partial results for each chunk are
//! computed independently, optionally in parallel, and merged so that the result does not depend
//! on the chunking.
//!
//! The service is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team, on top of the [hyper] HTTP library.
//! * [Serde](serde) performs (de)serialisation of JSON request and response data.
//! * [ndarray] provides [NumPy](https://numpy.org)-like n-dimensional arrays used in numerical
//!   computation, and [ndarray_stats] provides quantiles.
//! * [Rayon](rayon) runs independent aggregation tasks in parallel.

pub mod aggregation;
pub mod app;
pub mod app_state;
pub mod array;
pub mod chunker;
pub mod cli;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod models;
pub mod operation;
pub mod operations;
pub mod quantile;
pub mod resource_manager;
pub mod server;
pub mod summary;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod types;
pub mod validated_json;
pub mod validation;
