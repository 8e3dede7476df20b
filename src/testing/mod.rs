//! Test orchestration
//!
//! Test cases are registered into an explicit [`DependencyGraph`], which the
//! [`Scheduler`] runs in dependency order. Bodies talk to the server through
//! the command client, check responses with [`validate`], and wait on
//! asynchronous tasks with [`await_status`].

mod case;
mod graph;
mod poller;
pub mod report;
mod scheduler;
mod validate;

pub use case::{SkipReason, TestBody, TestCase, TestFuture, TestState};
pub use graph::DependencyGraph;
pub use poller::{await_status, PollRequest, StatusSource};
pub use scheduler::{AbortHandle, ExecutionContext, RunReport, Scheduler, TestResult};
pub use validate::{validate, validate_ok, DEFAULT_EXPECTED};
