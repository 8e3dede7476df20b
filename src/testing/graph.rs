//! Dependency graph over test cases
//!
//! Tests are kept in declaration order. Prerequisites may name tests that
//! are registered later, so edges are resolved, and cycles detected, when
//! an execution order is requested.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::{algo, Direction};

use crate::common::{Error, Result};

use super::case::TestCase;

/// Registry of test cases and their prerequisites
pub struct DependencyGraph<C> {
    cases: Vec<TestCase<C>>,
    index: HashMap<String, usize>,
}

impl<C> Default for DependencyGraph<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> DependencyGraph<C> {
    pub fn new() -> Self {
        Self {
            cases: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register `test`, to run only after every test in `depends_on` passed
    pub fn register<I, S>(&mut self, mut test: TestCase<C>, depends_on: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.index.contains_key(test.name()) {
            return Err(Error::DuplicateTest(test.name().to_string()));
        }

        let mut prerequisites: Vec<String> = Vec::new();
        for name in depends_on {
            let name = name.into();
            if !prerequisites.contains(&name) {
                prerequisites.push(name);
            }
        }
        test.set_prerequisites(prerequisites);

        self.index.insert(test.name().to_string(), self.cases.len());
        self.cases.push(test);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TestCase<C>> {
        self.index.get(name).map(|&i| &self.cases[i])
    }

    /// Tests in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &TestCase<C>> {
        self.cases.iter()
    }

    /// Build the petgraph view; node `i` is the `i`-th declared test and
    /// edges point from prerequisite to dependent
    fn build(&self) -> Result<DiGraph<usize, ()>> {
        let mut graph = DiGraph::with_capacity(self.cases.len(), self.cases.len());
        for i in 0..self.cases.len() {
            graph.add_node(i);
        }

        for (i, case) in self.cases.iter().enumerate() {
            for prerequisite in case.prerequisites() {
                let &p = self
                    .index
                    .get(prerequisite)
                    .ok_or_else(|| Error::UnknownPrerequisite {
                        test: case.name().to_string(),
                        prerequisite: prerequisite.clone(),
                    })?;
                graph.add_edge(NodeIndex::new(p), NodeIndex::new(i), ());
            }
        }

        Ok(graph)
    }

    /// Check that every prerequisite resolves and the graph is acyclic
    pub fn validate(&self) -> Result<()> {
        self.topological_order().map(|_| ())
    }

    /// Execution order: prerequisites first, ties broken by declaration order
    pub fn topological_order(&self) -> Result<Vec<&TestCase<C>>> {
        let graph = self.build()?;

        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        // Min-heap on declaration index
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.cases.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(&self.cases[i]);
            for dependent in graph.neighbors_directed(NodeIndex::new(i), Direction::Outgoing) {
                let d = &mut in_degree[dependent.index()];
                *d -= 1;
                if *d == 0 {
                    ready.push(Reverse(dependent.index()));
                }
            }
        }

        if order.len() < self.cases.len() {
            return Err(Error::CycleDetected(self.cycle_members(&graph)));
        }

        Ok(order)
    }

    /// Names of tests that sit on a cycle, in declaration order
    fn cycle_members(&self, graph: &DiGraph<usize, ()>) -> Vec<String> {
        let mut members: Vec<usize> = algo::tarjan_scc(graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&n| graph.contains_edge(n, n))
            })
            .flatten()
            .map(|n| n.index())
            .collect();
        members.sort_unstable();
        members
            .into_iter()
            .map(|i| self.cases[i].name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    fn case(name: &str) -> TestCase<()> {
        TestCase::new(name, |_: &()| futures_util::future::ready(Ok(())).boxed())
    }

    fn names(graph: &DependencyGraph<()>) -> Vec<String> {
        graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_declaration_order_kept_without_dependencies() {
        let mut graph = DependencyGraph::new();
        for name in ["ping", "version", "user", "unknown"] {
            graph.register(case(name), Vec::<String>::new()).unwrap();
        }
        assert_eq!(names(&graph), ["ping", "version", "user", "unknown"]);
    }

    #[test]
    fn test_prerequisites_come_first() {
        let mut graph = DependencyGraph::new();
        graph.register(case("query_variable"), ["add_variable"]).unwrap();
        graph.register(case("add_variable"), ["begin"]).unwrap();
        graph.register(case("ping"), Vec::<String>::new()).unwrap();
        graph.register(case("begin"), ["load"]).unwrap();
        graph.register(case("load"), ["ping"]).unwrap();

        let order = names(&graph);
        assert_eq!(order.len(), 5);
        for (dependent, prerequisite) in [
            ("query_variable", "add_variable"),
            ("add_variable", "begin"),
            ("begin", "load"),
            ("load", "ping"),
        ] {
            assert!(position(&order, prerequisite) < position(&order, dependent));
        }
    }

    #[test]
    fn test_valid_declaration_order_is_preserved() {
        let mut graph = DependencyGraph::new();
        graph.register(case("ping"), Vec::<String>::new()).unwrap();
        graph.register(case("clean"), Vec::<String>::new()).unwrap();
        graph.register(case("load"), ["ping"]).unwrap();
        graph.register(case("suites"), ["load"]).unwrap();
        graph.register(case("begin"), ["load"]).unwrap();
        graph.register(case("user"), Vec::<String>::new()).unwrap();
        graph.register(case("delete"), ["load", "begin"]).unwrap();

        assert_eq!(
            names(&graph),
            ["ping", "clean", "load", "suites", "begin", "user", "delete"]
        );
    }

    #[test]
    fn test_independent_ties_follow_declaration_order() {
        let mut graph = DependencyGraph::new();
        graph.register(case("late"), ["root"]).unwrap();
        graph.register(case("b"), Vec::<String>::new()).unwrap();
        graph.register(case("a"), Vec::<String>::new()).unwrap();
        graph.register(case("root"), Vec::<String>::new()).unwrap();

        assert_eq!(names(&graph), ["b", "a", "root", "late"]);
    }

    #[test]
    fn test_cycle_detected_names_members() {
        let mut graph = DependencyGraph::new();
        graph.register(case("ping"), Vec::<String>::new()).unwrap();
        graph.register(case("a"), ["c"]).unwrap();
        graph.register(case("b"), ["a"]).unwrap();
        graph.register(case("c"), ["b"]).unwrap();
        graph.register(case("downstream"), ["c"]).unwrap();

        match graph.topological_order() {
            Err(Error::CycleDetected(members)) => {
                assert_eq!(members, ["a", "b", "c"]);
            }
            other => panic!("Expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.register(case("loop"), ["loop"]).unwrap();
        assert!(matches!(
            graph.validate(),
            Err(Error::CycleDetected(members)) if members == ["loop"]
        ));
    }

    #[test]
    fn test_unknown_prerequisite() {
        let mut graph = DependencyGraph::new();
        graph.register(case("suites"), ["load_suite"]).unwrap();
        match graph.validate() {
            Err(Error::UnknownPrerequisite { test, prerequisite }) => {
                assert_eq!(test, "suites");
                assert_eq!(prerequisite, "load_suite");
            }
            other => panic!("Expected UnknownPrerequisite, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut graph = DependencyGraph::new();
        graph.register(case("ping"), Vec::<String>::new()).unwrap();
        assert!(matches!(
            graph.register(case("ping"), Vec::<String>::new()),
            Err(Error::DuplicateTest(name)) if name == "ping"
        ));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_repeated_prerequisite_is_collapsed() {
        let mut graph = DependencyGraph::new();
        graph.register(case("load"), Vec::<String>::new()).unwrap();
        graph.register(case("delete"), ["load", "load"]).unwrap();
        assert_eq!(graph.get("delete").unwrap().prerequisites(), ["load"]);
        assert_eq!(names(&graph), ["load", "delete"]);
    }
}
