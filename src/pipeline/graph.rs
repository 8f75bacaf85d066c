//! The executor graph a pipeline definition compiles into: resolved
//! executor instances plus their wiring, ready for the run engine.
//!
//! Generalizes the teacher's `PipelineGraph` (topological sort, cycle
//! detection over a single edge kind) to the four edge kinds `spec.md`
//! §4.6 requires, and ports
//! `examples/original_source/contentflow-lib/contentflow/pipeline/pipeline_factory.py::_determine_start_executor`
//! (sources-minus-targets, falling back to execution order, falling back
//! to the first declared executor).

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::pipeline::definition::{ConditionalTarget, Edge};
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Where a node's output goes, resolved from the definition's edges.
#[derive(Debug, Clone)]
pub enum Routing {
    /// No outgoing edge; this node's output is a pipeline output.
    Terminal,
    Sequential(String),
    Parallel(Vec<String>),
    Conditional { targets: Vec<ConditionalTarget> },
}

/// A compiled, validated pipeline: resolved executor instances and their
/// edges, ready to be driven by [`crate::pipeline::engine::PipelineEngine`].
pub struct PipelineGraph {
    pub name: String,
    pub nodes: IndexMap<String, Arc<dyn Executor>>,
    pub edges: Vec<Edge>,
    pub start: String,
}

impl PipelineGraph {
    /// Build and validate a graph from resolved nodes and edges. Checks:
    /// every edge references known node ids, the graph is acyclic, and
    /// `start` resolves to a known node.
    pub fn new(
        name: String,
        nodes: IndexMap<String, Arc<dyn Executor>>,
        edges: Vec<Edge>,
        start: Option<String>,
        start_fallback: Option<String>,
    ) -> Result<Self> {
        for edge in &edges {
            for id in edge_endpoints(edge) {
                if !nodes.contains_key(id) {
                    return Err(Error::Config(format!(
                        "edge references unknown executor '{id}'"
                    )));
                }
            }
        }

        let ids: Vec<String> = nodes.keys().cloned().collect();
        let start = match start {
            Some(s) => s,
            None => determine_start_executor(&ids, &edges, start_fallback.as_deref())?,
        };
        if !nodes.contains_key(&start) {
            return Err(Error::Config(format!(
                "start executor '{start}' is not a declared executor"
            )));
        }

        let graph = Self {
            name,
            nodes,
            edges,
            start,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// How `id`'s output is routed onward, per the declared edges.
    /// Returns `Routing::Terminal` when no edge originates at `id`.
    pub fn routing_for(&self, id: &str) -> Routing {
        for edge in &self.edges {
            match edge {
                Edge::Sequential { from, to } if from == id => {
                    return Routing::Sequential(to.clone())
                }
                Edge::Parallel { from, to } if from == id => {
                    return Routing::Parallel(to.clone())
                }
                Edge::Conditional { from, to } if from == id => {
                    return Routing::Conditional { targets: to.clone() }
                }
                Edge::Join { from, to, .. } if from.iter().any(|f| f == id) => {
                    return Routing::Sequential(to.clone())
                }
                _ => {}
            }
        }
        Routing::Terminal
    }

    /// The join edge whose `to` is `id`, if any. A node may be the target
    /// of at most one join edge (enforced at graph construction time in
    /// the factory).
    pub fn join_edge_for(&self, id: &str) -> Option<(&[String], &str)> {
        self.edges.iter().find_map(|edge| match edge {
            Edge::Join { from, to, .. } if to == id => Some((from.as_slice(), to.as_str())),
            _ => None,
        })
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut visiting = HashSet::new();
        let mut visited = HashSet::new();
        for id in self.nodes.keys() {
            if !visited.contains(id.as_str()) {
                self.visit(id, &mut visiting, &mut visited)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        visiting: &mut HashSet<&'a str>,
        visited: &mut HashSet<&'a str>,
    ) -> Result<()> {
        if visiting.contains(id) {
            return Err(Error::Config(format!(
                "pipeline '{}' contains a cycle through executor '{id}'",
                self.name
            )));
        }
        if visited.contains(id) {
            return Ok(());
        }
        visiting.insert(id);
        for successor in successors_of(&self.edges, id) {
            self.visit(successor, visiting, visited)?;
        }
        visiting.remove(id);
        visited.insert(id);
        Ok(())
    }
}

fn edge_endpoints(edge: &Edge) -> Vec<&str> {
    match edge {
        Edge::Sequential { from, to } => vec![from.as_str(), to.as_str()],
        Edge::Parallel { from, to } => {
            let mut v = vec![from.as_str()];
            v.extend(to.iter().map(String::as_str));
            v
        }
        Edge::Join { from, to, .. } => {
            let mut v: Vec<&str> = from.iter().map(String::as_str).collect();
            v.push(to.as_str());
            v
        }
        Edge::Conditional { from, to } => {
            let mut v = vec![from.as_str()];
            v.extend(to.iter().map(|t| t.target.as_str()));
            v
        }
    }
}

fn successors_of<'a>(edges: &'a [Edge], id: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    for edge in edges {
        match edge {
            Edge::Sequential { from, to } if from == id => out.push(to.as_str()),
            Edge::Parallel { from, to } if from == id => {
                out.extend(to.iter().map(String::as_str))
            }
            Edge::Conditional { from, to } if from == id => {
                out.extend(to.iter().map(|t| t.target.as_str()))
            }
            Edge::Join { from, to, .. } if from.iter().any(|f| f == id) => out.push(to.as_str()),
            _ => {}
        }
    }
    out
}

/// Sources-minus-targets rule: a node with no incoming edge is a source.
/// Exactly one source is the common case; ties break on declaration order.
/// If every node has an incoming edge (a cycle, or a single-node pipeline
/// with a self-loop), fall back to `fallback` (the definition's
/// `execution_sequence[0]`, per `spec.md` §4.6), and if that is absent
/// too, the first declared executor.
fn determine_start_executor(
    ids: &[String],
    edges: &[Edge],
    fallback: Option<&str>,
) -> Result<String> {
    if ids.is_empty() {
        return Err(Error::Config("pipeline has no executors".to_string()));
    }

    let mut targets: HashSet<&str> = HashSet::new();
    for edge in edges {
        match edge {
            Edge::Sequential { to, .. } => {
                targets.insert(to.as_str());
            }
            Edge::Parallel { to, .. } => {
                targets.extend(to.iter().map(String::as_str));
            }
            Edge::Join { to, .. } => {
                targets.insert(to.as_str());
            }
            Edge::Conditional { to, .. } => {
                targets.extend(to.iter().map(|t| t.target.as_str()));
            }
        }
    }

    for id in ids {
        if !targets.contains(id.as_str()) {
            return Ok(id.clone());
        }
    }

    if let Some(fallback) = fallback {
        if ids.iter().any(|id| id == fallback) {
            return Ok(fallback.to_string());
        }
    }

    Ok(ids[0].clone())
}

/// Topological order of node ids, for diagnostics and deterministic
/// iteration. Not used by the engine's runtime scheduling (which is
/// mailbox-driven), but useful for validation tooling and tests.
pub fn topological_order(graph: &PipelineGraph) -> Result<Vec<String>> {
    let mut in_degree: IndexMap<&str, usize> =
        graph.nodes.keys().map(|id| (id.as_str(), 0)).collect();
    for edge in &graph.edges {
        for successor in match edge {
            Edge::Sequential { to, .. } => vec![to.as_str()],
            Edge::Parallel { to, .. } => to.iter().map(String::as_str).collect(),
            Edge::Join { to, .. } => vec![to.as_str()],
            Edge::Conditional { to, .. } => to.iter().map(|t| t.target.as_str()).collect(),
        } {
            *in_degree.entry(successor).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::new();

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for successor in successors_of(&graph.edges, id) {
            if let Some(degree) = in_degree.get_mut(successor) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(successor);
                }
            }
        }
    }

    if order.len() != graph.nodes.len() {
        return Err(Error::Config(format!(
            "pipeline '{}' contains a cycle",
            graph.name
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determine_start_picks_the_sole_source() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let edges = vec![
            Edge::Sequential {
                from: "a".to_string(),
                to: "b".to_string(),
            },
            Edge::Sequential {
                from: "b".to_string(),
                to: "c".to_string(),
            },
        ];
        assert_eq!(determine_start_executor(&ids, &edges, None).unwrap(), "a");
    }

    #[test]
    fn determine_start_falls_back_to_first_when_no_source() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let edges = vec![
            Edge::Sequential {
                from: "a".to_string(),
                to: "b".to_string(),
            },
            Edge::Sequential {
                from: "b".to_string(),
                to: "a".to_string(),
            },
        ];
        assert_eq!(determine_start_executor(&ids, &edges, None).unwrap(), "a");
    }
}
