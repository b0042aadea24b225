//! Dependency graph derived from upstream markers
//!
//! An edge `u -> v` means "v consumes the result of u". The graph is a pure
//! function of a [`StepRegistry`]: building it twice from the same registry
//! yields the same graph.

use crate::core::{
    error::{BridgeError, Result},
    registry::StepRegistry,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// One upstream marker, resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Producing step
    pub from: String,
    /// Consuming step
    pub to: String,
    /// Parameter of `to` that receives the result
    pub param: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// Step names in registration order
    nodes: Vec<String>,
    edges: Vec<Edge>,
    /// Distinct upstream steps per node, first-seen order
    upstream: HashMap<String, Vec<String>>,
    /// Distinct downstream steps per node, edge order
    downstream: HashMap<String, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl DependencyGraph {
    /// Resolve every marker into an edge, then reject cycles.
    ///
    /// Fails with `UnknownDependency` when a marker names an unregistered
    /// step, `SchemaMismatch` when a marked parameter's schema differs from
    /// the upstream step's return schema, and `CyclicDependency` carrying
    /// the full cycle.
    pub fn build(steps: &StepRegistry) -> Result<Self> {
        let mut graph = DependencyGraph {
            nodes: steps.all().map(|s| s.name.clone()).collect(),
            ..Default::default()
        };

        for step in steps.all() {
            for param in &step.params {
                let Some(upstream_name) = &param.upstream else {
                    continue;
                };
                let upstream = steps
                    .get(upstream_name)
                    .map_err(|_| BridgeError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: upstream_name.clone(),
                    })?;
                if upstream.return_schema != param.schema {
                    return Err(BridgeError::SchemaMismatch {
                        step: step.name.clone(),
                        param: param.name.clone(),
                        reason: format!(
                            "'{}' returns {} but the parameter expects {}",
                            upstream.name,
                            upstream.return_schema.shape(),
                            param.schema.shape()
                        ),
                    });
                }
                graph.add_edge(Edge {
                    from: upstream_name.clone(),
                    to: step.name.clone(),
                    param: param.name.clone(),
                });
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(BridgeError::CyclicDependency { cycle });
        }

        Ok(graph)
    }

    fn add_edge(&mut self, edge: Edge) {
        let upstream = self.upstream.entry(edge.to.clone()).or_default();
        if !upstream.contains(&edge.from) {
            upstream.push(edge.from.clone());
        }
        let downstream = self.downstream.entry(edge.from.clone()).or_default();
        if !downstream.contains(&edge.to) {
            downstream.push(edge.to.clone());
        }
        self.edges.push(edge);
    }

    /// Depth-first search along "depends on" links, tracking the current path
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut path: Vec<&str> = Vec::new();

        for node in &self.nodes {
            if !marks.contains_key(node.as_str()) {
                if let Some(cycle) = self.visit_for_cycle(node, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit_for_cycle<'a>(
        &'a self,
        node: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        marks.insert(node, Mark::Visiting);
        path.push(node);

        for dep in self.upstream_of(node) {
            match marks.get(dep.as_str()) {
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
                Some(Mark::Done) => {}
                None => {
                    if let Some(cycle) = self.visit_for_cycle(dep, marks, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        path.pop();
        marks.insert(node, Mark::Done);
        None
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn contains(&self, step: &str) -> bool {
        self.nodes.iter().any(|n| n == step)
    }

    /// Steps whose results `step` consumes
    pub fn upstream_of(&self, step: &str) -> &[String] {
        self.upstream.get(step).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Steps consuming the result of `step`
    pub fn downstream_of(&self, step: &str) -> &[String] {
        self.downstream.get(step).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Steps with no upstream, in registration order
    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| self.upstream_of(n.as_str()).is_empty())
            .map(String::as_str)
            .collect()
    }

    /// Steps nothing consumes, in registration order
    pub fn leaves(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| self.downstream_of(n.as_str()).is_empty())
            .map(String::as_str)
            .collect()
    }

    /// Every step after all of its upstreams. Ties follow registration order.
    pub fn topological_order(&self) -> Vec<String> {
        let mut result = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::new();

        for node in &self.nodes {
            self.visit_in_order(node, &mut visited, &mut result);
        }

        result
    }

    fn visit_in_order<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(node) {
            return;
        }
        for dep in self.upstream_of(node) {
            self.visit_in_order(dep, visited, result);
        }
        result.push(node.to_string());
    }

    /// The subgraph over the steps selected by `keep`. Edges leaving the
    /// selection are dropped.
    pub fn restrict<F>(&self, keep: F) -> DependencyGraph
    where
        F: Fn(&str) -> bool,
    {
        let mut graph = DependencyGraph {
            nodes: self.nodes.iter().filter(|n| keep(n.as_str())).cloned().collect(),
            ..Default::default()
        };
        for edge in &self.edges {
            if keep(&edge.from) && keep(&edge.to) {
                graph.add_edge(edge.clone());
            }
        }
        graph
    }

    /// Step -> distinct upstream steps, for every node
    pub fn adjacency(&self) -> BTreeMap<String, Vec<String>> {
        self.nodes
            .iter()
            .map(|n| (n.clone(), self.upstream_of(n).to_vec()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step::{Dependency, StepBuilder, StepDescriptor};

    fn source(name: &str) -> StepDescriptor {
        StepBuilder::new(name)
            .handler(|_args| async { anyhow::Ok(String::new()) })
            .build()
            .unwrap()
    }

    fn consumer(name: &str, deps: &[(&str, &str)]) -> StepDescriptor {
        let mut builder = StepBuilder::new(name);
        for (param, upstream) in deps {
            builder = builder.param_from(*param, Dependency::<String>::on(*upstream));
        }
        builder
            .handler(|_args| async { anyhow::Ok(String::new()) })
            .build()
            .unwrap()
    }

    fn registry(steps: Vec<StepDescriptor>) -> StepRegistry {
        let mut registry = StepRegistry::new();
        for step in steps {
            registry.register(step).unwrap();
        }
        registry
    }

    #[test]
    fn test_one_edge_per_marker() {
        let steps = registry(vec![
            source("a"),
            source("b"),
            consumer("c", &[("left", "a"), ("right", "b"), ("again", "a")]),
        ]);
        let graph = DependencyGraph::build(&steps).unwrap();

        assert_eq!(graph.edges().len(), 3);
        assert_eq!(graph.upstream_of("c"), &["a".to_string(), "b".to_string()]);
        assert_eq!(graph.downstream_of("a"), &["c".to_string()]);
        assert_eq!(graph.roots(), vec!["a", "b"]);
        assert_eq!(graph.leaves(), vec!["c"]);
    }

    #[test]
    fn test_two_step_cycle_names_both() {
        let steps = registry(vec![
            consumer("a", &[("x", "b")]),
            consumer("b", &[("y", "a")]),
        ]);
        let err = DependencyGraph::build(&steps).unwrap_err();
        match err {
            BridgeError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_longer_cycle_reported_in_dependency_order() {
        let steps = registry(vec![
            source("start"),
            consumer("a", &[("x", "start"), ("y", "c")]),
            consumer("b", &[("x", "a")]),
            consumer("c", &[("x", "b")]),
        ]);
        let err = DependencyGraph::build(&steps).unwrap_err();
        assert_eq!(err.to_string(), "cyclic dependency: a -> c -> b -> a");
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let steps = registry(vec![consumer("loop", &[("x", "loop")])]);
        let err = DependencyGraph::build(&steps).unwrap_err();
        assert_eq!(err.kind(), "cyclic_dependency");
    }

    #[test]
    fn test_unknown_dependency_names_both_steps() {
        let steps = registry(vec![consumer("clean", &[("raw", "fetch")])]);
        let err = DependencyGraph::build(&steps).unwrap_err();
        assert_eq!(err.kind(), "unknown_dependency");
        assert_eq!(err.to_string(), "step 'clean' depends on unknown step 'fetch'");
    }

    #[test]
    fn test_marker_type_must_match_upstream_return() {
        let fetch = StepBuilder::new("fetch")
            .handler(|_args| async { anyhow::Ok(42_u32) })
            .build()
            .unwrap();
        let steps = registry(vec![fetch, consumer("clean", &[("raw", "fetch")])]);
        let err = DependencyGraph::build(&steps).unwrap_err();
        assert_eq!(err.kind(), "schema_mismatch");
        assert!(err.to_string().contains("'raw'"));
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn test_build_is_pure() {
        let steps = registry(vec![source("a"), consumer("b", &[("x", "a")])]);
        assert_eq!(
            DependencyGraph::build(&steps).unwrap(),
            DependencyGraph::build(&steps).unwrap()
        );
    }

    #[test]
    fn test_topological_order_puts_dependencies_first() {
        let steps = registry(vec![
            consumer("report", &[("x", "clean"), ("y", "fetch")]),
            consumer("clean", &[("x", "fetch")]),
            source("fetch"),
            source("unrelated"),
        ]);
        let graph = DependencyGraph::build(&steps).unwrap();
        assert_eq!(
            graph.topological_order(),
            vec!["fetch", "clean", "report", "unrelated"]
        );
    }

    #[test]
    fn test_restrict_drops_outside_edges() {
        let steps = registry(vec![
            source("a"),
            consumer("b", &[("x", "a")]),
            consumer("c", &[("x", "b")]),
        ]);
        let graph = DependencyGraph::build(&steps).unwrap();
        let sub = graph.restrict(|n| n != "a");
        assert_eq!(sub.nodes(), &["b".to_string(), "c".to_string()]);
        assert_eq!(sub.edges().len(), 1);
        assert_eq!(sub.roots(), vec!["b"]);
        assert_eq!(sub.adjacency()["c"], vec!["b".to_string()]);
    }
}
