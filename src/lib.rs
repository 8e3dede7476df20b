//! flowprobe - conformance test runner for a workflow server's HTTP interface
//!
//! The library holds the command client, the dependency-ordered test
//! scheduler with its completion poller, and the conformance suite itself.

pub mod cli;
pub mod client;
pub mod commands;
pub mod common;
pub mod suite;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
