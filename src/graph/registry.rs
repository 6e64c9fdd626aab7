//! Node registry
//!
//! Owns every node, the two deduplication indices (symbolic-name key and
//! normalized file key) and the adjacency maps. All state sits behind one
//! lock so that upserts race to a single winner and merges are never
//! observed half done.

use super::node::{LoadKind, LoadOutcome, Node, NodeId, Resolved};
use super::pending::PendingNodes;
use super::{GraphError, IdentityConflict};
use crate::identity::{is_symbolic_name, SymbolicName};
use crate::loader::{ComponentLoader, LoadError};
use crate::sources::{file_key, is_valid_path, normalize_path};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Registry state guarded by [`DependencyGraph`]'s lock
#[derive(Debug, Default)]
pub(super) struct GraphState {
    /// Live nodes; merged-away nodes are removed
    pub(super) nodes: BTreeMap<NodeId, Node>,

    by_name: HashMap<String, NodeId>,

    by_file: HashMap<String, NodeId>,

    /// Dependant -> its dependencies
    pub(super) dependencies: HashMap<NodeId, BTreeSet<NodeId>>,

    /// Dependency -> its dependants
    pub(super) dependants: HashMap<NodeId, BTreeSet<NodeId>>,

    /// Merged-away node -> survivor
    merged_into: HashMap<NodeId, NodeId>,

    anomalies: Vec<IdentityConflict>,

    next_id: u32,
}

impl GraphState {
    pub(super) fn canonical(&self, id: NodeId) -> NodeId {
        self.merged_into.get(&id).copied().unwrap_or(id)
    }

    fn allocate(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn ensure_by_name(&mut self, name: &SymbolicName) -> NodeId {
        let key = name.key();
        if let Some(&id) = self.by_name.get(&key) {
            return id;
        }

        let id = self.allocate();
        debug!("Creating node {} from name {}.", id, name);
        self.nodes.insert(id, Node::from_name(id, name.clone()));
        self.by_name.insert(key, id);
        id
    }

    fn ensure_by_file(&mut self, path: &Path) -> NodeId {
        let key = file_key(path);
        if let Some(&id) = self.by_file.get(&key) {
            return id;
        }

        let id = self.allocate();
        let file = normalize_path(path);
        debug!("Creating node {} from file {}.", id, file.display());
        self.nodes.insert(id, Node::from_file(id, file));
        self.by_file.insert(key, id);
        id
    }

    fn insert_edge(&mut self, dependant: NodeId, dependency: NodeId) {
        self.dependencies
            .entry(dependant)
            .or_default()
            .insert(dependency);
        self.dependants
            .entry(dependency)
            .or_default()
            .insert(dependant);
    }

    /// Fold `source` into `target` and drop `source`.
    ///
    /// Edges between the two collapse instead of becoming self-loops.
    fn merge(&mut self, target: NodeId, source: NodeId) -> Result<(), GraphError> {
        if target == source {
            return Err(GraphError::PreconditionViolation(format!(
                "cannot merge node {} with itself",
                target
            )));
        }
        if !self.nodes.contains_key(&target) {
            return Err(GraphError::UnknownNode(target));
        }
        let removed = self
            .nodes
            .remove(&source)
            .ok_or(GraphError::UnknownNode(source))?;
        debug!("Merging {} {} into {}.", source, removed, target);

        for slot in self.by_name.values_mut().chain(self.by_file.values_mut()) {
            if *slot == source {
                *slot = target;
            }
        }

        if let Some(dependencies) = self.dependencies.remove(&source) {
            for dependency in dependencies {
                if let Some(set) = self.dependants.get_mut(&dependency) {
                    set.remove(&source);
                }
                if dependency == target {
                    continue;
                }
                let dependency = if dependency == source { target } else { dependency };
                self.insert_edge(target, dependency);
            }
        }

        if let Some(dependants) = self.dependants.remove(&source) {
            for dependant in dependants {
                if let Some(set) = self.dependencies.get_mut(&dependant) {
                    set.remove(&source);
                }
                if dependant == target || dependant == source {
                    continue;
                }
                self.insert_edge(dependant, target);
            }
        }

        for survivor in self.merged_into.values_mut() {
            if *survivor == source {
                *survivor = target;
            }
        }
        self.merged_into.insert(source, target);

        Ok(())
    }

    /// Index a freshly loaded node and register its declared references.
    fn process_loaded(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))?;
        let Some(resolved) = node.resolved().cloned() else {
            return Err(GraphError::PreconditionViolation(format!(
                "node {} is not loaded",
                node
            )));
        };
        let name_key = node.name().map(SymbolicName::key);
        let file = node.file().cloned();

        // the loaded node survives; a stale occupant of its name is folded in
        if let Some(key) = name_key {
            if let Some(previous) = self.by_name.insert(key, id) {
                if previous != id && self.nodes.contains_key(&previous) {
                    self.merge(id, previous)?;
                }
            }
        }

        if let Some(file) = file {
            if let Some(previous) = self.by_file.insert(file_key(&file), id) {
                if previous != id && self.nodes.contains_key(&previous) {
                    self.process_file_occupant(id, previous, &resolved, file)?;
                }
            }
        }

        for reference in &resolved.declared_references {
            match SymbolicName::parse(reference) {
                Ok(name) => {
                    let dependency = self.ensure_by_name(&name);
                    self.insert_edge(id, dependency);
                }
                Err(e) => warn!(
                    "Skipping reference [{}] of [{}]: {}",
                    reference, resolved.identity, e
                ),
            }
        }

        Ok(())
    }

    fn process_file_occupant(
        &mut self,
        id: NodeId,
        previous: NodeId,
        resolved: &Resolved,
        file: PathBuf,
    ) -> Result<(), GraphError> {
        let existing = self
            .nodes
            .get(&previous)
            .and_then(Node::resolved)
            .map(|r| r.identity.clone());

        match existing {
            Some(existing) if existing != resolved.identity => {
                warn!(
                    "There will be multiple nodes with the same file [{}]: [{}] and [{}].",
                    file.display(),
                    existing,
                    resolved.identity
                );
                self.anomalies.push(IdentityConflict {
                    file,
                    existing_node: previous,
                    existing,
                    loaded_node: id,
                    loaded: resolved.identity.clone(),
                });
                Ok(())
            }
            _ => self.merge(id, previous),
        }
    }
}

/// How a source string was classified
enum Source {
    Name(SymbolicName),
    File(PathBuf),
}

fn classify_source(source: &str) -> Result<Source, GraphError> {
    let trimmed = source.trim();
    if is_symbolic_name(trimmed) {
        if let Ok(name) = SymbolicName::parse(trimmed) {
            return Ok(Source::Name(name));
        }
    }
    if is_valid_path(trimmed) {
        return Ok(Source::File(PathBuf::from(trimmed)));
    }
    Err(GraphError::InvalidSource(source.to_string()))
}

/// What to hand the loader
enum LoadRequest {
    Name(SymbolicName),
    File(PathBuf),
}

impl std::fmt::Display for LoadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadRequest::Name(name) => write!(f, "name {}", name),
            LoadRequest::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run the loader, turning a panic into an ordinary load failure.
fn resolve_isolated(
    loader: &dyn ComponentLoader,
    request: &LoadRequest,
) -> Result<Resolved, LoadError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| match request {
        LoadRequest::Name(name) => loader.resolve_by_name(name),
        LoadRequest::File(path) => loader.resolve_by_file(path),
    }));

    match result {
        Ok(component) => Resolved::from_component(component?),
        Err(payload) => Err(LoadError::new(format!(
            "Loader panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

/// Thread-safe dependency graph of components
#[derive(Debug, Default)]
pub struct DependencyGraph {
    state: RwLock<GraphState>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    // Lock accessor helpers
    pub(super) fn read_state(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read().expect("dependency graph lock poisoned")
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write().expect("dependency graph lock poisoned")
    }

    /// Node registered under `name`, created if absent
    pub fn ensure_node_by_name(&self, name: &SymbolicName) -> NodeId {
        self.write_state().ensure_by_name(name)
    }

    /// Node registered under the normalized `path`, created if absent
    pub fn ensure_node_by_file(&self, path: &Path) -> NodeId {
        self.write_state().ensure_by_file(path)
    }

    /// Node for a source string: a 4-part symbolic name or a path.
    pub fn ensure_node_from_source(&self, source: &str) -> Result<NodeId, GraphError> {
        Ok(match classify_source(source)? {
            Source::Name(name) => self.ensure_node_by_name(&name),
            Source::File(path) => self.ensure_node_by_file(&path),
        })
    }

    /// Node currently registered for a source string, without creating one
    pub fn find_node_from_source(&self, source: &str) -> Result<Option<NodeId>, GraphError> {
        let state = self.read_state();
        Ok(match classify_source(source)? {
            Source::Name(name) => state.by_name.get(&name.key()).copied(),
            Source::File(path) => state.by_file.get(&file_key(&path)).copied(),
        })
    }

    /// Record that `dependant` depends on `dependency` (idempotent)
    pub fn register_dependency(
        &self,
        dependant: NodeId,
        dependency: NodeId,
    ) -> Result<(), GraphError> {
        let mut state = self.write_state();
        let dependant = state.canonical(dependant);
        let dependency = state.canonical(dependency);
        for id in [dependant, dependency] {
            if !state.nodes.contains_key(&id) {
                return Err(GraphError::UnknownNode(id));
            }
        }
        state.insert_edge(dependant, dependency);
        Ok(())
    }

    /// Live sequence of nodes still waiting for a load of `kind`
    pub fn pending(&self, kind: LoadKind) -> PendingNodes<'_> {
        PendingNodes::new(self, kind)
    }

    pub fn load_node_from_file(
        &self,
        id: NodeId,
        loader: &dyn ComponentLoader,
    ) -> Result<(), GraphError> {
        self.load_node(id, LoadKind::File, loader)
    }

    pub fn load_node_from_name(
        &self,
        id: NodeId,
        loader: &dyn ComponentLoader,
    ) -> Result<(), GraphError> {
        self.load_node(id, LoadKind::Name, loader)
    }

    /// Resolve a node through `loader`.
    ///
    /// A loader failure is recorded on the node and is not an error here;
    /// `Err` means the call itself broke the node's state machine. If a
    /// concurrent load or merge settles the node while the loader runs,
    /// this outcome is discarded.
    pub fn load_node(
        &self,
        id: NodeId,
        kind: LoadKind,
        loader: &dyn ComponentLoader,
    ) -> Result<(), GraphError> {
        let (id, request) = {
            let state = self.read_state();
            let id = state.canonical(id);
            let node = state.nodes.get(&id).ok_or(GraphError::UnknownNode(id))?;
            node.check_can_load(kind)?;
            let request = match kind {
                LoadKind::Name => node.name().cloned().map(LoadRequest::Name),
                LoadKind::File => node.file().cloned().map(LoadRequest::File),
            };
            let request = request.ok_or_else(|| {
                GraphError::PreconditionViolation(format!("node {} has no {} source", node, kind))
            })?;
            (id, request)
        };

        debug!("Loading from {}.", request);
        let outcome = match resolve_isolated(loader, &request) {
            Ok(resolved) => {
                if let LoadRequest::Name(requested) = &request {
                    if resolved.identity != *requested.identity() {
                        warn!(
                            "Requesting the load of [{}], but obtained [{}].",
                            requested, resolved.identity
                        );
                    }
                }
                LoadOutcome::Loaded(resolved)
            }
            Err(err) => {
                debug!("Failed to load from {}: {}", request, err);
                LoadOutcome::Failed(err)
            }
        };

        let loaded = matches!(outcome, LoadOutcome::Loaded(_));
        let mut state = self.write_state();
        let current = state.canonical(id);
        let node = state
            .nodes
            .get_mut(&current)
            .ok_or(GraphError::UnknownNode(current))?;

        // another thread may have loaded or merged this node while the
        // loader ran; the check above held when the call was made
        if node.check_can_load(kind).is_err() {
            debug!(
                "Dropping stale load of {} from {}: node is now {} ({}).",
                id, request, current, node
            );
            return Ok(());
        }
        node.transition(kind, outcome)?;
        let id = current;

        if loaded {
            state.process_loaded(id)?;
        }
        Ok(())
    }

    /// Fold `source` into `target`: keys and edges move, `source` is removed.
    pub fn merge_nodes(&self, target: NodeId, source: NodeId) -> Result<(), GraphError> {
        self.write_state().merge(target, source)
    }

    /// Survivor handle for `id` (itself unless merged away)
    pub fn canonical(&self, id: NodeId) -> NodeId {
        self.read_state().canonical(id)
    }

    /// Whether `id` is a live node (merged-away handles are not)
    pub fn contains(&self, id: NodeId) -> bool {
        self.read_state().nodes.contains_key(&id)
    }

    /// Snapshot of the node behind `id`, following merges
    pub fn node(&self, id: NodeId) -> Option<Node> {
        let state = self.read_state();
        state.nodes.get(&state.canonical(id)).cloned()
    }

    /// Snapshot of every live node, in id order
    pub fn nodes(&self) -> Vec<Node> {
        self.read_state().nodes.values().cloned().collect()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.read_state().nodes.keys().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.read_state().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    /// Number of distinct dependency edges
    pub fn edge_count(&self) -> usize {
        self.read_state().dependencies.values().map(BTreeSet::len).sum()
    }

    /// Same-file identity conflicts seen so far
    pub fn anomalies(&self) -> Vec<IdentityConflict> {
        self.read_state().anomalies.clone()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
