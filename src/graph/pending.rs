//! Live iteration over nodes awaiting a load attempt

use super::node::{LoadKind, NodeId};
use super::registry::DependencyGraph;
use std::collections::HashSet;

/// Nodes that still need a load of one kind.
///
/// The sequence is live: nodes created while iterating (typically the
/// references of a component loaded in the loop body) are yielded too. A
/// node is offered at most once, even if it is still pending because the
/// caller skipped it. Each step takes the graph lock only briefly, so the
/// caller may load nodes between steps.
#[derive(Debug)]
pub struct PendingNodes<'g> {
    graph: &'g DependencyGraph,
    kind: LoadKind,
    visited: HashSet<NodeId>,
}

impl<'g> PendingNodes<'g> {
    pub(super) fn new(graph: &'g DependencyGraph, kind: LoadKind) -> Self {
        Self {
            graph,
            kind,
            visited: HashSet::new(),
        }
    }

    pub fn kind(&self) -> LoadKind {
        self.kind
    }
}

impl Iterator for PendingNodes<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let state = self.graph.read_state();
        for (id, node) in &state.nodes {
            if !self.visited.insert(*id) {
                continue;
            }
            if node.needs_load(self.kind) {
                return Some(*id);
            }
        }
        None
    }
}
