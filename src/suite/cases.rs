//! Test bodies and their declaration table
//!
//! [`CASES`] lists every test in declaration order together with its
//! prerequisites; [`build_graph`] turns it into a [`DependencyGraph`].

use futures_util::FutureExt;

use crate::client::{Authorization, CommandRequest, Method};
use crate::common::{Error, Result};
use crate::testing::{validate, DependencyGraph, TestCase, TestFuture, DEFAULT_EXPECTED};

use super::definition::{encode_definition, load_definition, suite_name};
use super::{Suite, COMPLETE};

/// A test body as a plain function pointer
pub type CaseFn = for<'a> fn(&'a Suite) -> TestFuture<'a>;

/// Static description of one test
#[derive(Clone, Copy)]
pub struct CaseSpec {
    pub name: &'static str,
    pub body: CaseFn,
    pub depends_on: &'static [&'static str],
    pub skip: Option<&'static str>,
    /// Skipped unless a token endpoint is configured
    pub needs_auth: bool,
}

impl std::fmt::Debug for CaseSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseSpec")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("skip", &self.skip)
            .finish()
    }
}

const fn case(name: &'static str, body: CaseFn, depends_on: &'static [&'static str]) -> CaseSpec {
    CaseSpec {
        name,
        body,
        depends_on,
        skip: None,
        needs_auth: false,
    }
}

const fn skipped(
    name: &'static str,
    body: CaseFn,
    depends_on: &'static [&'static str],
    reason: &'static str,
) -> CaseSpec {
    CaseSpec {
        name,
        body,
        depends_on,
        skip: Some(reason),
        needs_auth: false,
    }
}

pub const NO_AUTH_REASON: &str = "no token endpoint configured";

/// Every test, in declaration order
pub static CASES: &[CaseSpec] = &[
    case("ping", ping, &[]),
    case("version", version, &[]),
    case("clean_suite", clean_suite, &[]),
    case("load_suite", load_suite, &["ping"]),
    case("suites", suites, &["load_suite"]),
    skipped("edit_script", edit_script, &["load_suite"], "forces task submission"),
    case("begin_suite", begin_suite, &["load_suite"]),
    case("get_suite", get_suite, &["load_suite"]),
    case("add", add, &["begin_suite"]),
    case("add_variable", add_variable, &["begin_suite"]),
    case("query_variable", query_variable, &["add_variable"]),
    case("requeue", requeue, &["begin_suite"]),
    case("suspend_suite", suspend_suite, &["begin_suite"]),
    case("resume_suite", resume_suite, &["suspend_suite"]),
    case("start_family_a", start_family_a, &["begin_suite"]),
    case("start_family_b", start_family_b, &["begin_suite"]),
    case("group", group, &["load_suite"]),
    case("delete_suite", delete_suite, &["load_suite", "start_family_b"]),
    case("user", user, &[]),
    case("unknown", unknown, &[]),
    case("server_version", server_version, &[]),
    case("ssl", ssl, &[]),
    case("stats", stats, &[]),
    case("stats_reset", stats_reset, &[]),
    case("stats_server", stats_server, &[]),
    skipped("terminate", terminate, &[], "cannot be tested safely"),
    CaseSpec {
        name: "token_authentication",
        body: token_authentication,
        depends_on: &[],
        skip: None,
        needs_auth: true,
    },
];

/// Look a test up by name
pub fn find(name: &str) -> Option<&'static CaseSpec> {
    CASES.iter().find(|c| c.name == name)
}

/// Register every case of [`CASES`] for a run against `suite`
pub fn build_graph(suite: &Suite) -> Result<DependencyGraph<Suite>> {
    let mut graph = DependencyGraph::new();
    for spec in CASES {
        let mut test = TestCase::new(spec.name, spec.body);
        if let Some(reason) = spec.skip {
            test = test.skip(reason);
        } else if spec.needs_auth && suite.tokens().is_none() {
            test = test.skip(NO_AUTH_REASON);
        }
        graph.register(test, spec.depends_on.iter().copied())?;
    }
    graph.validate()?;
    Ok(graph)
}

async fn simple(suite: &Suite, method: Method, command: &str, args: &[&str]) -> Result<()> {
    suite.command(method, command, args, DEFAULT_EXPECTED).await?;
    Ok(())
}

fn ping(suite: &Suite) -> TestFuture<'_> {
    simple(suite, Method::Get, "ping", &[]).boxed()
}

fn version(suite: &Suite) -> TestFuture<'_> {
    simple(suite, Method::Get, "version", &[]).boxed()
}

fn clean_suite(suite: &Suite) -> TestFuture<'_> {
    async move {
        let node = suite.node();
        suite
            .command(Method::Delete, "delete", &["yes", &node], &[200, 404])
            .await?;
        Ok(())
    }
    .boxed()
}

fn load_suite(suite: &Suite) -> TestFuture<'_> {
    async move {
        let text = load_definition(&suite.config().definition)?;
        let encoded = encode_definition(&text);
        suite
            .command(Method::Post, "load", &[&encoded], &[200, 201])
            .await?;
        Ok(())
    }
    .boxed()
}

fn suites(suite: &Suite) -> TestFuture<'_> {
    async move {
        let text = load_definition(&suite.config().definition)?;
        let expected = suite_name(&text).ok_or_else(|| {
            Error::TestAssertion(format!(
                "{} declares no suite",
                suite.config().definition.display()
            ))
        })?;

        let result = suite.command(Method::Get, "suites", &[], DEFAULT_EXPECTED).await?;
        if result.trimmed() != expected {
            return Err(Error::TestAssertion(format!(
                "suites returned '{}', expected '{}'",
                result.trimmed(),
                expected
            )));
        }
        Ok(())
    }
    .boxed()
}

fn edit_script(suite: &Suite) -> TestFuture<'_> {
    async move {
        let task = suite.child("a/b");
        let script = encode_definition(&load_definition(&suite.config().script)?);
        suite
            .command(
                Method::Put,
                "edit_script",
                &[&task, "submit_file", &script, "false", "no_run"],
                DEFAULT_EXPECTED,
            )
            .await?;
        suite
            .command(Method::Put, "edit_script", &[&task, "edit"], DEFAULT_EXPECTED)
            .await?;
        Ok(())
    }
    .boxed()
}

fn begin_suite(suite: &Suite) -> TestFuture<'_> {
    async move { suite.node_op(&suite.node(), "begin").await }.boxed()
}

fn get_suite(suite: &Suite) -> TestFuture<'_> {
    async move {
        let node = suite.node();
        let result = suite.command(Method::Get, "get", &[&node], DEFAULT_EXPECTED).await?;

        let Some(path) = &suite.config().expected_definition else {
            return Ok(());
        };
        let expected = load_definition(path)?;
        if result.body() != expected {
            return Err(Error::TestAssertion(definition_mismatch(&expected, result.body())));
        }
        Ok(())
    }
    .boxed()
}

/// Describe the first line where `actual` departs from `expected`
fn definition_mismatch(expected: &str, actual: &str) -> String {
    let mut expected_lines = expected.split_inclusive('\n');
    let mut actual_lines = actual.split_inclusive('\n');
    let mut line = 1;
    loop {
        match (expected_lines.next(), actual_lines.next()) {
            (Some(e), Some(a)) if e == a => line += 1,
            (e, a) => {
                return format!(
                    "definition differs at line {}: expected {:?}, got {:?}",
                    line,
                    e.unwrap_or("<end>"),
                    a.unwrap_or("<end>")
                )
            }
        }
    }
}

fn add(suite: &Suite) -> TestFuture<'_> {
    async move {
        suite
            .command(Method::Post, "add", &["foo", "bar"], &[405])
            .await?;
        Ok(())
    }
    .boxed()
}

fn add_variable(suite: &Suite) -> TestFuture<'_> {
    async move { suite.add_variable(&suite.node(), "foo", "bar").await }.boxed()
}

fn query_variable(suite: &Suite) -> TestFuture<'_> {
    async move {
        let target = format!("{}:foo", suite.node());
        let result = suite
            .command(Method::Get, "query", &["variable", &target], DEFAULT_EXPECTED)
            .await?;
        if result.trimmed() != "bar" {
            return Err(Error::TestAssertion(format!(
                "variable {} is '{}', expected 'bar'",
                target,
                result.trimmed()
            )));
        }
        Ok(())
    }
    .boxed()
}

fn requeue(suite: &Suite) -> TestFuture<'_> {
    async move { suite.node_op(&suite.node(), "requeue").await }.boxed()
}

fn suspend_suite(suite: &Suite) -> TestFuture<'_> {
    async move { suite.node_op(&suite.node(), "suspend").await }.boxed()
}

fn resume_suite(suite: &Suite) -> TestFuture<'_> {
    async move { suite.node_op(&suite.node(), "resume").await }.boxed()
}

/// Requeue a family, fire its `begin` event and wait for each task in turn
async fn run_family(suite: &Suite, family: &str, tasks: &[&str], api_host: bool) -> Result<()> {
    let node = suite.child(family);
    suite.node_op(&node, "requeue").await?;
    if api_host {
        suite
            .add_variable(&node, "ECF_API_HOST", &suite.config().api_host)
            .await?;
    }
    suite.set_event(&node, "begin").await?;

    for task in tasks {
        suite.await_node(&format!("{node}/{task}"), COMPLETE).await?;
    }
    Ok(())
}

fn start_family_a(suite: &Suite) -> TestFuture<'_> {
    run_family(suite, "a", &["a", "b", "c"], false).boxed()
}

fn start_family_b(suite: &Suite) -> TestFuture<'_> {
    run_family(suite, "b", &["a_api", "b_api", "c_api"], true).boxed()
}

fn group(suite: &Suite) -> TestFuture<'_> {
    async move {
        let batch = format!("get;why {}", suite.node());
        suite
            .command(Method::Get, "group", &[&batch], DEFAULT_EXPECTED)
            .await?;
        suite
            .command(
                Method::Get,
                "group",
                &["halt=yes;reloadpasswdfile;restart;"],
                DEFAULT_EXPECTED,
            )
            .await?;
        Ok(())
    }
    .boxed()
}

fn delete_suite(suite: &Suite) -> TestFuture<'_> {
    async move {
        let node = suite.node();
        suite
            .command(Method::Delete, "delete", &["yes", &node], DEFAULT_EXPECTED)
            .await?;
        Ok(())
    }
    .boxed()
}

fn user(suite: &Suite) -> TestFuture<'_> {
    async move {
        suite.command(Method::Get, "user", &["fred"], &[405]).await?;
        Ok(())
    }
    .boxed()
}

fn unknown(suite: &Suite) -> TestFuture<'_> {
    async move {
        suite.command(Method::Get, "xxxyyy", &[], &[500]).await?;
        Ok(())
    }
    .boxed()
}

fn server_version(suite: &Suite) -> TestFuture<'_> {
    simple(suite, Method::Get, "server_version", &[]).boxed()
}

fn ssl(suite: &Suite) -> TestFuture<'_> {
    async move {
        let request = CommandRequest::new(Method::Get, "stats").param("ssl", "on");
        suite.request(&request, DEFAULT_EXPECTED).await?;
        Ok(())
    }
    .boxed()
}

fn stats(suite: &Suite) -> TestFuture<'_> {
    simple(suite, Method::Get, "stats", &[]).boxed()
}

fn stats_reset(suite: &Suite) -> TestFuture<'_> {
    simple(suite, Method::Put, "stats_reset", &[]).boxed()
}

fn stats_server(suite: &Suite) -> TestFuture<'_> {
    simple(suite, Method::Get, "stats_server", &[]).boxed()
}

fn terminate(suite: &Suite) -> TestFuture<'_> {
    simple(suite, Method::Put, "terminate", &["yes"]).boxed()
}

fn token_authentication(suite: &Suite) -> TestFuture<'_> {
    async move {
        let tokens = suite
            .tokens()
            .ok_or_else(|| Error::Auth(NO_AUTH_REASON.to_string()))?;
        let token = tokens.fetch_token().await?;

        let request = CommandRequest::new(Method::Put, "log").args(["get", "5"]);
        let result = suite
            .client()
            .send_with(&request, Authorization::Bearer(&token))
            .await?;
        validate(result, DEFAULT_EXPECTED)?;
        Ok(())
    }
    .boxed()
}
