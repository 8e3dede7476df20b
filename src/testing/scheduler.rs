//! Sequential, dependency-ordered test execution
//!
//! Tests run one at a time in the graph's topological order. A test whose
//! prerequisite did not pass is skipped without invoking its body, and the
//! skip propagates to everything downstream of it.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tracing::Instrument;

use crate::common::{Error, Result};

use super::case::{SkipReason, TestCase, TestState};
use super::graph::DependencyGraph;

/// Outcome of one test
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub state: TestState,
    pub skip: Option<SkipReason>,
    pub error: Option<Error>,
    pub duration: Duration,
}

/// Per-run map from test name to state
///
/// Built fresh for every run; only legal transitions are accepted.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    states: HashMap<String, TestState>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; tests not yet touched are pending
    pub fn state(&self, name: &str) -> TestState {
        self.states.get(name).copied().unwrap_or(TestState::Pending)
    }

    pub fn transition(&mut self, name: &str, next: TestState) -> Result<()> {
        let current = self.state(name);
        if !current.can_move_to(next) {
            return Err(Error::InvalidTransition {
                test: name.to_string(),
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        self.states.insert(name.to_string(), next);
        Ok(())
    }

    /// First prerequisite that did not pass, if any
    fn blocking_prerequisite<C>(&self, case: &TestCase<C>) -> Option<SkipReason> {
        case.prerequisites().iter().find_map(|name| {
            let state = self.state(name);
            (state != TestState::Passed).then(|| SkipReason::Prerequisite {
                name: name.clone(),
                state,
            })
        })
    }
}

/// Requests a clean stop: the running test finishes, nothing else starts
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Results of a whole run, in execution order
#[derive(Debug, Default)]
pub struct RunReport {
    pub results: Vec<TestResult>,
}

impl RunReport {
    pub fn get(&self, name: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn state(&self, name: &str) -> Option<TestState> {
        self.get(name).map(|r| r.state)
    }

    fn count(&self, state: TestState) -> usize {
        self.results.iter().filter(|r| r.state == state).count()
    }

    pub fn passed(&self) -> usize {
        self.count(TestState::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(TestState::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(TestState::Skipped)
    }

    /// Whether the run stopped early
    pub fn aborted(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r.skip, Some(SkipReason::Aborted)))
    }

    /// No failures and no tests lost to an abort
    pub fn success(&self) -> bool {
        self.failed() == 0 && !self.aborted()
    }

    /// Convert an unsuccessful run into [`Error::SuiteFailed`]
    pub fn into_result(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::SuiteFailed {
                failed: self.failed(),
                aborted: self.aborted(),
            })
        }
    }
}

/// Runs a dependency graph against a context
#[derive(Debug, Default)]
pub struct Scheduler {
    abort: AbortHandle,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Run every test in `graph`
    ///
    /// Only graph errors (cycles, unknown prerequisites) are returned as
    /// `Err`, before any test runs; test failures are part of the report.
    pub async fn run<C>(&self, graph: &DependencyGraph<C>, ctx: &C) -> Result<RunReport> {
        self.run_with(graph, ctx, |_| {}).await
    }

    /// Like [`Scheduler::run`], calling `on_result` as each test settles
    pub async fn run_with<C, F>(
        &self,
        graph: &DependencyGraph<C>,
        ctx: &C,
        mut on_result: F,
    ) -> Result<RunReport>
    where
        F: FnMut(&TestResult),
    {
        let order = graph.topological_order()?;
        let mut states = ExecutionContext::new();
        let mut report = RunReport::default();

        tracing::info!(tests = order.len(), "starting run");

        for case in order {
            let result = self.run_case(case, ctx, &mut states).await?;
            on_result(&result);
            report.results.push(result);
        }

        tracing::info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            "run finished"
        );

        Ok(report)
    }

    async fn run_case<C>(
        &self,
        case: &TestCase<C>,
        ctx: &C,
        states: &mut ExecutionContext,
    ) -> Result<TestResult> {
        let name = case.name();

        let skip = if self.abort.is_aborted() {
            Some(SkipReason::Aborted)
        } else if let Some(reason) = case.skip_reason() {
            Some(SkipReason::Annotated(reason.to_string()))
        } else {
            states.blocking_prerequisite(case)
        };

        if let Some(reason) = skip {
            tracing::info!(test = name, reason = %reason, "skipped");
            states.transition(name, TestState::Skipped)?;
            return Ok(TestResult {
                name: name.to_string(),
                state: TestState::Skipped,
                skip: Some(reason),
                error: None,
                duration: Duration::ZERO,
            });
        }

        states.transition(name, TestState::Running)?;
        let span = tracing::info_span!("test", test = name);
        let start = Instant::now();

        // A panicking body (e.g. a failed assert) fails only this test
        let outcome = AssertUnwindSafe(async { case.run(ctx).await })
            .catch_unwind()
            .instrument(span)
            .await
            .unwrap_or_else(|payload| Err(Error::panicked(payload.as_ref())));
        let duration = start.elapsed();

        let (state, error) = match outcome {
            Ok(()) => {
                tracing::info!(test = name, ?duration, "passed");
                (TestState::Passed, None)
            }
            Err(e) => {
                tracing::warn!(test = name, code = e.code(), error = %e, "failed");
                (TestState::Failed, Some(e))
            }
        };
        states.transition(name, state)?;

        Ok(TestResult {
            name: name.to_string(),
            state,
            skip: None,
            error,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::{ready, FutureExt};
    use std::sync::Mutex;

    /// Records which bodies ran, in order
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn hit(&self, name: &str) {
            self.calls.lock().unwrap().push(name.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, name: &str) -> usize {
            self.calls().iter().filter(|c| *c == name).count()
        }
    }

    fn passing(name: &'static str) -> TestCase<Recorder> {
        TestCase::new(name, move |rec: &Recorder| {
            rec.hit(name);
            ready(Ok(())).boxed()
        })
    }

    fn failing(name: &'static str) -> TestCase<Recorder> {
        TestCase::new(name, move |rec: &Recorder| {
            rec.hit(name);
            ready(Err(Error::TestAssertion(format!("{name} broke")))).boxed()
        })
    }

    fn none() -> Vec<String> {
        Vec::new()
    }

    #[tokio::test]
    async fn test_all_pass_in_dependency_order() {
        let mut graph = DependencyGraph::new();
        graph.register(passing("suites"), ["load"]).unwrap();
        graph.register(passing("ping"), none()).unwrap();
        graph.register(passing("load"), ["ping"]).unwrap();

        let rec = Recorder::default();
        let report = Scheduler::new().run(&graph, &rec).await.unwrap();

        assert_eq!(rec.calls(), ["ping", "load", "suites"]);
        assert!(report.success());
        assert_eq!(report.passed(), 3);
        let names: Vec<&str> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["ping", "load", "suites"]);
    }

    #[tokio::test]
    async fn test_failure_cascades_to_transitive_dependents() {
        let mut graph = DependencyGraph::new();
        graph.register(passing("ping"), none()).unwrap();
        graph.register(failing("load"), ["ping"]).unwrap();
        graph.register(passing("begin"), ["load"]).unwrap();
        graph.register(passing("add_variable"), ["begin"]).unwrap();
        graph.register(passing("query_variable"), ["add_variable"]).unwrap();
        graph.register(passing("user"), none()).unwrap();

        let rec = Recorder::default();
        let report = Scheduler::new().run(&graph, &rec).await.unwrap();

        assert_eq!(report.state("load"), Some(TestState::Failed));
        for name in ["begin", "add_variable", "query_variable"] {
            assert_eq!(report.state(name), Some(TestState::Skipped));
            assert_eq!(rec.count(name), 0, "{name} body must not run");
        }
        assert_eq!(
            report.get("begin").unwrap().skip,
            Some(SkipReason::Prerequisite {
                name: "load".into(),
                state: TestState::Failed
            })
        );
        assert_eq!(
            report.get("add_variable").unwrap().skip,
            Some(SkipReason::Prerequisite {
                name: "begin".into(),
                state: TestState::Skipped
            })
        );

        // Unrelated tests still run
        assert_eq!(report.state("user"), Some(TestState::Passed));
        assert_eq!(rec.count("user"), 1);
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_panicking_body_fails_only_that_test() {
        let mut graph = DependencyGraph::new();
        graph
            .register(
                TestCase::new("asserts", |rec: &Recorder| {
                    rec.hit("asserts");
                    async move {
                        assert_eq!(1, 2, "assertion in body");
                        Ok(())
                    }
                    .boxed()
                }),
                none(),
            )
            .unwrap();
        graph.register(passing("dependent"), ["asserts"]).unwrap();
        graph.register(passing("independent"), none()).unwrap();

        let rec = Recorder::default();
        let report = Scheduler::new().run(&graph, &rec).await.unwrap();

        let result = report.get("asserts").unwrap();
        assert_eq!(result.state, TestState::Failed);
        assert!(matches!(
            &result.error,
            Some(Error::Panicked { message }) if message.contains("assertion in body")
        ));
        assert_eq!(report.state("dependent"), Some(TestState::Skipped));
        assert_eq!(rec.count("dependent"), 0);
        assert_eq!(report.state("independent"), Some(TestState::Passed));
        assert_eq!(rec.count("independent"), 1);
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_failure_error_is_captured() {
        let mut graph = DependencyGraph::new();
        graph.register(failing("get_suite"), none()).unwrap();

        let report = Scheduler::new().run(&graph, &Recorder::default()).await.unwrap();
        let result = report.get("get_suite").unwrap();
        assert_eq!(result.state, TestState::Failed);
        assert!(matches!(
            &result.error,
            Some(Error::TestAssertion(msg)) if msg == "get_suite broke"
        ));
        assert!(matches!(
            report.into_result(),
            Err(Error::SuiteFailed { failed: 1, aborted: false })
        ));
    }

    #[tokio::test]
    async fn test_annotated_skip_does_not_fail_run() {
        let mut graph = DependencyGraph::new();
        graph.register(passing("load"), none()).unwrap();
        graph
            .register(passing("edit_script").skip("forces task submission"), ["load"])
            .unwrap();
        graph.register(passing("after_edit"), ["edit_script"]).unwrap();

        let rec = Recorder::default();
        let report = Scheduler::new().run(&graph, &rec).await.unwrap();

        assert_eq!(rec.calls(), ["load"]);
        assert_eq!(
            report.get("edit_script").unwrap().skip,
            Some(SkipReason::Annotated("forces task submission".into()))
        );
        assert_eq!(report.state("after_edit"), Some(TestState::Skipped));
        assert!(report.success());
    }

    #[tokio::test]
    async fn test_cycle_fails_before_any_test_runs() {
        let mut graph = DependencyGraph::new();
        graph.register(passing("ping"), none()).unwrap();
        graph.register(passing("a"), ["b"]).unwrap();
        graph.register(passing("b"), ["a"]).unwrap();

        let rec = Recorder::default();
        let err = Scheduler::new().run(&graph, &rec).await.unwrap_err();
        assert!(matches!(err, Error::CycleDetected(_)));
        assert!(rec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_abort_lets_current_test_finish_and_skips_rest() {
        let scheduler = Scheduler::new();
        let handle = scheduler.abort_handle();

        let mut graph = DependencyGraph::new();
        graph.register(passing("ping"), none()).unwrap();
        graph
            .register(
                TestCase::new("interrupt", move |rec: &Recorder| {
                    rec.hit("interrupt");
                    handle.abort();
                    ready(Ok(())).boxed()
                }),
                none(),
            )
            .unwrap();
        graph.register(passing("stats"), none()).unwrap();

        let rec = Recorder::default();
        let report = scheduler.run(&graph, &rec).await.unwrap();

        assert_eq!(rec.calls(), ["ping", "interrupt"]);
        assert_eq!(report.state("interrupt"), Some(TestState::Passed));
        assert_eq!(report.get("stats").unwrap().skip, Some(SkipReason::Aborted));
        assert!(report.aborted());
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_on_result_sees_every_test() {
        let mut graph = DependencyGraph::new();
        graph.register(passing("a"), none()).unwrap();
        graph.register(failing("b"), none()).unwrap();
        graph.register(passing("c"), ["b"]).unwrap();

        let mut seen = Vec::new();
        Scheduler::new()
            .run_with(&graph, &Recorder::default(), |r| {
                seen.push((r.name.clone(), r.state))
            })
            .await
            .unwrap();

        assert_eq!(
            seen,
            [
                ("a".to_string(), TestState::Passed),
                ("b".to_string(), TestState::Failed),
                ("c".to_string(), TestState::Skipped),
            ]
        );
    }

    #[test]
    fn test_context_rejects_second_outcome() {
        let mut ctx = ExecutionContext::new();
        ctx.transition("ping", TestState::Running).unwrap();
        ctx.transition("ping", TestState::Passed).unwrap();
        assert!(matches!(
            ctx.transition("ping", TestState::Failed),
            Err(Error::InvalidTransition { .. })
        ));
        assert_eq!(ctx.state("ping"), TestState::Passed);
        assert_eq!(ctx.state("other"), TestState::Pending);
    }
}
