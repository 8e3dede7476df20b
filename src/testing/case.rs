//! Test case definitions and per-test state

use std::fmt;

use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::common::Result;

/// Future returned by a test body
pub type TestFuture<'a> = BoxFuture<'a, Result<()>>;

/// Body of a test: borrows the run context for the duration of the test
pub type TestBody<C> = Box<dyn for<'a> Fn(&'a C) -> TestFuture<'a> + Send + Sync>;

/// A named test with its body, prerequisites and optional skip annotation
pub struct TestCase<C> {
    name: String,
    body: TestBody<C>,
    prerequisites: Vec<String>,
    skip: Option<String>,
}

impl<C> TestCase<C> {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a C) -> TestFuture<'a> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
            prerequisites: Vec::new(),
            skip: None,
        }
    }

    /// Attach a skip annotation; the body never runs
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prerequisites(&self) -> &[String] {
        &self.prerequisites
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip.as_deref()
    }

    pub(crate) fn set_prerequisites(&mut self, prerequisites: Vec<String>) {
        self.prerequisites = prerequisites;
    }

    /// Invoke the body against `ctx`
    pub fn run<'a>(&self, ctx: &'a C) -> TestFuture<'a> {
        (self.body)(ctx)
    }
}

impl<C> fmt::Debug for TestCase<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

/// Lifecycle state of a test within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestState {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl TestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TestState::Passed | TestState::Failed | TestState::Skipped)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_move_to(self, next: TestState) -> bool {
        matches!(
            (self, next),
            (TestState::Pending, TestState::Running)
                | (TestState::Pending, TestState::Skipped)
                | (TestState::Running, TestState::Passed)
                | (TestState::Running, TestState::Failed)
        )
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestState::Pending => "pending",
            TestState::Running => "running",
            TestState::Passed => "passed",
            TestState::Failed => "failed",
            TestState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Why a test did not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Skip annotation on the test itself
    Annotated(String),
    /// A prerequisite did not pass
    Prerequisite { name: String, state: TestState },
    /// The run was aborted before the test was reached
    Aborted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Annotated(reason) => write!(f, "{}", reason),
            SkipReason::Prerequisite { name, state } => {
                write!(f, "prerequisite '{}' {}", name, state)
            }
            SkipReason::Aborted => f.write_str("run aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    #[test]
    fn test_legal_transitions() {
        assert!(TestState::Pending.can_move_to(TestState::Running));
        assert!(TestState::Pending.can_move_to(TestState::Skipped));
        assert!(TestState::Running.can_move_to(TestState::Passed));
        assert!(TestState::Running.can_move_to(TestState::Failed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [TestState::Passed, TestState::Failed, TestState::Skipped] {
            assert!(terminal.is_terminal());
            for next in [
                TestState::Pending,
                TestState::Running,
                TestState::Passed,
                TestState::Failed,
                TestState::Skipped,
            ] {
                assert!(!terminal.can_move_to(next));
            }
        }
        assert!(!TestState::Pending.can_move_to(TestState::Passed));
        assert!(!TestState::Running.can_move_to(TestState::Skipped));
    }

    #[tokio::test]
    async fn test_case_runs_body_with_context() {
        let case: TestCase<u32> = TestCase::new("double", |n: &u32| {
            let n = *n;
            async move {
                assert_eq!(n * 2, 84);
                Ok(())
            }
            .boxed()
        });
        assert_eq!(case.name(), "double");
        assert!(case.skip_reason().is_none());
        case.run(&42).await.unwrap();
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::Prerequisite {
            name: "load_suite".into(),
            state: TestState::Failed,
        };
        assert_eq!(reason.to_string(), "prerequisite 'load_suite' failed");
        assert_eq!(SkipReason::Annotated("later".into()).to_string(), "later");
    }
}
