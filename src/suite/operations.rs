//! Named operations that can be run one at a time from the command line

use futures_util::FutureExt;

use crate::common::{Error, Result};
use crate::testing::TestFuture;

use super::cases::{find, CaseFn, CASES};
use super::Suite;

/// A helper taking positional string arguments
pub type HelperFn = for<'a> fn(&'a Suite, &'a [String]) -> TestFuture<'a>;

#[derive(Clone, Copy)]
pub enum Invoke {
    Case(CaseFn),
    Helper(HelperFn),
}

/// Descriptor of one runnable operation
#[derive(Clone)]
pub struct Operation {
    pub name: &'static str,
    pub usage: &'static str,
    pub arity: usize,
    pub invoke: Invoke,
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Tests run by `suite_operations`, in order
const SUITE_OPERATIONS: &[&str] = &[
    "clean_suite",
    "load_suite",
    "begin_suite",
    "get_suite",
    "edit_script",
    "delete_suite",
];

/// Quick check run when no subcommand is given
const SMOKE: &[&str] = &["ping", "version", "user", "unknown", "suite_operations"];

const HELPERS: &[Operation] = &[
    Operation {
        name: "add_variable",
        usage: "add_variable NODE NAME VALUE",
        arity: 3,
        invoke: Invoke::Helper(add_variable),
    },
    Operation {
        name: "node_op",
        usage: "node_op NODE OP",
        arity: 2,
        invoke: Invoke::Helper(node_op),
    },
    Operation {
        name: "set_event",
        usage: "set_event NODE EVENT",
        arity: 2,
        invoke: Invoke::Helper(set_event),
    },
    Operation {
        name: "await_status",
        usage: "await_status NODE STATUS",
        arity: 2,
        invoke: Invoke::Helper(await_status),
    },
    Operation {
        name: "suite_operations",
        usage: "suite_operations",
        arity: 0,
        invoke: Invoke::Helper(suite_operations),
    },
    Operation {
        name: "smoke",
        usage: "smoke",
        arity: 0,
        invoke: Invoke::Helper(smoke),
    },
];

/// Name-to-operation mapping: every suite test plus the helpers
#[derive(Debug, Clone)]
pub struct OperationTable {
    operations: Vec<Operation>,
}

impl Default for OperationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTable {
    pub fn new() -> Self {
        let tests = CASES.iter().map(|spec| Operation {
            name: spec.name,
            usage: spec.name,
            arity: 0,
            invoke: Invoke::Case(spec.body),
        });
        Self {
            operations: tests.chain(HELPERS.iter().cloned()).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.operations.iter().map(|op| op.name).collect()
    }

    /// Resolve `name`, check the argument count and run it
    ///
    /// Tests run directly, ignoring skip annotations and prerequisites.
    pub async fn invoke(&self, suite: &Suite, name: &str, args: &[String]) -> Result<()> {
        let op = self.get(name).ok_or_else(|| Error::UnknownOperation {
            name: name.to_string(),
            available: self.names().join(", "),
        })?;

        if args.len() != op.arity {
            return Err(Error::Config(format!(
                "'{}' takes {} argument(s), got {}. Usage: {}",
                op.name,
                op.arity,
                args.len(),
                op.usage
            )));
        }

        tracing::info!(operation = op.name, ?args, "running operation");
        match op.invoke {
            Invoke::Case(body) => body(suite).await,
            Invoke::Helper(helper) => helper(suite, args).await,
        }
    }
}

fn add_variable<'a>(suite: &'a Suite, args: &'a [String]) -> TestFuture<'a> {
    suite.add_variable(&args[0], &args[1], &args[2]).boxed()
}

fn node_op<'a>(suite: &'a Suite, args: &'a [String]) -> TestFuture<'a> {
    suite.node_op(&args[0], &args[1]).boxed()
}

fn set_event<'a>(suite: &'a Suite, args: &'a [String]) -> TestFuture<'a> {
    suite.set_event(&args[0], &args[1]).boxed()
}

fn await_status<'a>(suite: &'a Suite, args: &'a [String]) -> TestFuture<'a> {
    async move {
        suite.await_node(&args[0], &args[1]).await?;
        Ok(())
    }
    .boxed()
}

fn suite_operations<'a>(suite: &'a Suite, _args: &'a [String]) -> TestFuture<'a> {
    async move {
        for name in SUITE_OPERATIONS {
            let spec = find(name).ok_or_else(|| Error::UnknownOperation {
                name: name.to_string(),
                available: CASES.iter().map(|c| c.name).collect::<Vec<_>>().join(", "),
            })?;
            (spec.body)(suite).await?;
        }
        Ok(())
    }
    .boxed()
}

fn smoke<'a>(suite: &'a Suite, _args: &'a [String]) -> TestFuture<'a> {
    async move {
        let table = OperationTable::new();
        for name in SMOKE {
            table.invoke(suite, name, &[]).await?;
        }
        Ok(())
    }
    .boxed()
}
