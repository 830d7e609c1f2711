//! STAGEWISE: deterministic startup stage derivation.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod snapshot;
pub mod validation;
pub mod engine;
pub mod storage;
pub mod workflow;
pub mod api;
