//! Dependency and dependant queries
//!
//! Closures are computed with an explicit worklist so that cycles and deep
//! chains terminate without recursion. Every query follows merges, and an
//! unknown handle yields an empty set.

use super::node::NodeId;
use super::registry::{DependencyGraph, GraphState};
use crate::identity::UnversionedIdentity;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
enum Direction {
    Dependencies,
    Dependants,
}

impl GraphState {
    fn adjacency(&self, direction: Direction) -> &HashMap<NodeId, BTreeSet<NodeId>> {
        match direction {
            Direction::Dependencies => &self.dependencies,
            Direction::Dependants => &self.dependants,
        }
    }

    fn direct(&self, id: NodeId, direction: Direction) -> BTreeSet<NodeId> {
        let id = self.canonical(id);
        self.adjacency(direction)
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Transitive closure from `id`, excluding `id` unless a cycle leads back
    fn closure(&self, id: NodeId, direction: Direction) -> BTreeSet<NodeId> {
        let start = self.canonical(id);
        let adjacency = self.adjacency(direction);

        let mut result = BTreeSet::new();
        let mut processed = HashSet::new();
        let mut worklist = vec![start];

        while let Some(current) = worklist.pop() {
            if !processed.insert(current) {
                continue;
            }
            for &next in adjacency.get(&current).into_iter().flatten() {
                result.insert(next);
                if !processed.contains(&next) {
                    worklist.push(next);
                }
            }
        }

        result
    }

    fn group_of(&self, id: NodeId) -> Option<&UnversionedIdentity> {
        self.nodes
            .get(&id)
            .and_then(|node| node.identity())
            .map(|identity| &identity.unversioned)
    }
}

impl DependencyGraph {
    /// Nodes `id` depends on directly
    pub fn direct_dependencies(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.read_state().direct(id, Direction::Dependencies)
    }

    /// Nodes depending directly on `id`
    pub fn direct_dependants(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.read_state().direct(id, Direction::Dependants)
    }

    /// Every node reachable from `id` through dependency edges
    pub fn all_dependencies(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.read_state().closure(id, Direction::Dependencies)
    }

    /// Every node from which `id` is reachable
    pub fn all_dependants(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.read_state().closure(id, Direction::Dependants)
    }

    /// Transitive dependencies that are not direct ones
    pub fn indirect_dependencies(&self, id: NodeId) -> BTreeSet<NodeId> {
        let state = self.read_state();
        let direct = state.direct(id, Direction::Dependencies);
        state
            .closure(id, Direction::Dependencies)
            .difference(&direct)
            .copied()
            .collect()
    }

    /// Transitive dependants that are not direct ones
    pub fn indirect_dependants(&self, id: NodeId) -> BTreeSet<NodeId> {
        let state = self.read_state();
        let direct = state.direct(id, Direction::Dependants);
        state
            .closure(id, Direction::Dependants)
            .difference(&direct)
            .copied()
            .collect()
    }

    /// Dependencies of `id` plus every other version of the groups they touch.
    ///
    /// Like [`all_dependencies`](Self::all_dependencies), `id` itself only
    /// appears when it sits on a cycle.
    pub fn all_dependencies_including_group(&self, id: NodeId) -> BTreeSet<NodeId> {
        let state = self.read_state();
        let root = state.canonical(id);
        if !state.nodes.contains_key(&root) {
            return BTreeSet::new();
        }

        let mut result = state.closure(root, Direction::Dependencies);

        let groups: HashSet<&UnversionedIdentity> =
            result.iter().filter_map(|&n| state.group_of(n)).collect();
        for &other in state.nodes.keys() {
            if state.group_of(other).is_some_and(|g| groups.contains(g)) {
                result.insert(other);
            }
        }

        result
    }
}
