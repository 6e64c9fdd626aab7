//! Graph nodes and their load-status state machine

use super::GraphError;
use crate::identity::{SymbolicName, VersionedIdentity};
use crate::loader::{LoadError, ResolvedComponent};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Stable handle of a node inside a [`DependencyGraph`](super::DependencyGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which source a load attempt used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadKind {
    Name,
    File,
}

impl LoadKind {
    pub fn other(self) -> Self {
        match self {
            LoadKind::Name => LoadKind::File,
            LoadKind::File => LoadKind::Name,
        }
    }
}

impl fmt::Display for LoadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadKind::Name => write!(f, "name"),
            LoadKind::File => write!(f, "file"),
        }
    }
}

/// Status of one load kind on one node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum LoadStatus {
    #[default]
    NotAttempted,
    Loaded,
    Failed(LoadError),
}

/// A component as seen once a load succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub identity: VersionedIdentity,
    pub location: PathBuf,
    pub declared_references: Vec<String>,
}

impl Resolved {
    /// Validate what a loader returned.
    pub fn from_component(component: ResolvedComponent) -> Result<Self, LoadError> {
        let name = SymbolicName::parse(&component.canonical_name).map_err(|e| {
            LoadError::new(format!(
                "Loader returned invalid name '{}': {}",
                component.canonical_name, e
            ))
        })?;
        Ok(Self {
            identity: name.into_identity(),
            location: component.location,
            declared_references: component.declared_references,
        })
    }
}

/// Result of a load attempt, fed to [`Node::transition`]
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Loaded(Resolved),
    Failed(LoadError),
}

/// One reference point to a component, before and after resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    id: NodeId,
    name: Option<SymbolicName>,
    file: Option<PathBuf>,
    by_name: LoadStatus,
    by_file: LoadStatus,
    resolved: Option<Resolved>,
}

impl Node {
    pub(crate) fn from_name(id: NodeId, name: SymbolicName) -> Self {
        Self {
            id,
            name: Some(name),
            file: None,
            by_name: LoadStatus::NotAttempted,
            by_file: LoadStatus::NotAttempted,
            resolved: None,
        }
    }

    pub(crate) fn from_file(id: NodeId, file: PathBuf) -> Self {
        Self {
            id,
            name: None,
            file: Some(file),
            by_name: LoadStatus::NotAttempted,
            by_file: LoadStatus::NotAttempted,
            resolved: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> Option<&SymbolicName> {
        self.name.as_ref()
    }

    pub fn file(&self) -> Option<&PathBuf> {
        self.file.as_ref()
    }

    pub fn status(&self, kind: LoadKind) -> &LoadStatus {
        match kind {
            LoadKind::Name => &self.by_name,
            LoadKind::File => &self.by_file,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.resolved.is_some()
    }

    /// The kind that loaded this node, if any
    pub fn loaded_via(&self) -> Option<LoadKind> {
        [LoadKind::File, LoadKind::Name]
            .into_iter()
            .find(|kind| *self.status(*kind) == LoadStatus::Loaded)
    }

    pub fn resolved(&self) -> Option<&Resolved> {
        self.resolved.as_ref()
    }

    /// Resolved identity, or the identity requested by name before loading
    pub fn identity(&self) -> Option<&VersionedIdentity> {
        self.resolved
            .as_ref()
            .map(|r| &r.identity)
            .or_else(|| self.name.as_ref().map(SymbolicName::identity))
    }

    /// Most recent load error; file errors take precedence
    pub fn last_error(&self) -> Option<&LoadError> {
        [&self.by_file, &self.by_name]
            .into_iter()
            .find_map(|status| match status {
                LoadStatus::Failed(err) => Some(err),
                _ => None,
            })
    }

    /// Whether this node still waits for a load attempt of `kind`
    pub fn needs_load(&self, kind: LoadKind) -> bool {
        let has_source = match kind {
            LoadKind::Name => self.name.is_some(),
            LoadKind::File => self.file.is_some(),
        };
        has_source && !self.is_loaded() && *self.status(kind) == LoadStatus::NotAttempted
    }

    /// Reject a load attempt that would break the state machine.
    pub(crate) fn check_can_load(&self, kind: LoadKind) -> Result<(), GraphError> {
        let has_source = match kind {
            LoadKind::Name => self.name.is_some(),
            LoadKind::File => self.file.is_some(),
        };
        if !has_source {
            return Err(self.violation(kind, "the node has no such source"));
        }

        match self.status(kind) {
            LoadStatus::Loaded => return Err(self.violation(kind, "it's already loaded")),
            LoadStatus::Failed(_) => {
                return Err(self.violation(kind, "previous attempt failed"))
            }
            LoadStatus::NotAttempted => {}
        }

        if *self.status(kind.other()) == LoadStatus::Loaded {
            return Err(self.violation(
                kind,
                &format!("it's already loaded from {}", kind.other()),
            ));
        }

        Ok(())
    }

    /// Apply the outcome of a load attempt.
    ///
    /// `NotAttempted -> Loaded | Failed` per kind, both terminal; once one
    /// kind loaded, the node accepts no further transition of either kind.
    pub(crate) fn transition(
        &mut self,
        kind: LoadKind,
        outcome: LoadOutcome,
    ) -> Result<(), GraphError> {
        self.check_can_load(kind)?;

        match outcome {
            LoadOutcome::Loaded(resolved) => {
                match kind {
                    LoadKind::File => {
                        self.by_file = LoadStatus::Loaded;
                        self.name = Some(SymbolicName::from(resolved.identity.clone()));
                    }
                    LoadKind::Name => {
                        self.by_name = LoadStatus::Loaded;
                        self.file = Some(resolved.location.clone());
                    }
                }
                self.resolved = Some(resolved);
            }
            LoadOutcome::Failed(err) => match kind {
                LoadKind::File => self.by_file = LoadStatus::Failed(err),
                LoadKind::Name => self.by_name = LoadStatus::Failed(err),
            },
        }

        Ok(())
    }

    fn violation(&self, kind: LoadKind, reason: &str) -> GraphError {
        GraphError::PreconditionViolation(format!(
            "cannot load {} from {}, {}",
            self, kind, reason
        ))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(resolved) = &self.resolved {
            return write!(f, "{}", resolved.identity);
        }
        match (&self.file, &self.name) {
            (Some(file), _) => write!(f, "[not loaded] {}", file.display()),
            (None, Some(name)) => write!(f, "[not loaded] {}", name),
            (None, None) => write!(f, "[not loaded] {}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIB: &str = "Lib, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null";

    fn resolved(name: &str, location: &str) -> Resolved {
        Resolved::from_component(ResolvedComponent::new(name, location, vec![])).unwrap()
    }

    fn name_node() -> Node {
        Node::from_name(NodeId(0), SymbolicName::parse(LIB).unwrap())
    }

    fn file_node() -> Node {
        Node::from_file(NodeId(1), PathBuf::from("/bin/Lib.dll"))
    }

    fn is_violation(result: Result<(), GraphError>) -> bool {
        matches!(result, Err(GraphError::PreconditionViolation(_)))
    }

    #[test]
    fn test_new_name_node_is_pending() {
        let node = name_node();
        assert!(!node.is_loaded());
        assert!(node.needs_load(LoadKind::Name));
        assert!(!node.needs_load(LoadKind::File));
        assert_eq!(node.identity().unwrap().name(), "Lib");
        assert!(node.to_string().starts_with("[not loaded] Lib"));
    }

    #[test]
    fn test_file_node_has_no_identity_before_loading() {
        let node = file_node();
        assert!(node.identity().is_none());
        assert!(node.needs_load(LoadKind::File));
        assert_eq!(node.to_string(), "[not loaded] /bin/Lib.dll");
    }

    #[test]
    fn test_load_from_file_sets_name() {
        let mut node = file_node();
        node.transition(LoadKind::File, LoadOutcome::Loaded(resolved(LIB, "/bin/Lib.dll")))
            .unwrap();

        assert!(node.is_loaded());
        assert_eq!(node.loaded_via(), Some(LoadKind::File));
        assert_eq!(node.name().unwrap().to_string(), LIB);
        assert_eq!(node.to_string(), LIB);
        assert!(!node.needs_load(LoadKind::Name));
    }

    #[test]
    fn test_load_from_name_sets_file() {
        let mut node = name_node();
        node.transition(LoadKind::Name, LoadOutcome::Loaded(resolved(LIB, "/gac/Lib.dll")))
            .unwrap();

        assert_eq!(node.file(), Some(&PathBuf::from("/gac/Lib.dll")));
        assert_eq!(node.loaded_via(), Some(LoadKind::Name));
    }

    #[test]
    fn test_cannot_load_twice() {
        let mut node = file_node();
        node.transition(LoadKind::File, LoadOutcome::Loaded(resolved(LIB, "/bin/Lib.dll")))
            .unwrap();

        assert!(is_violation(node.transition(
            LoadKind::File,
            LoadOutcome::Loaded(resolved(LIB, "/bin/Lib.dll"))
        )));
    }

    #[test]
    fn test_cannot_fail_after_loaded() {
        let mut node = file_node();
        node.transition(LoadKind::File, LoadOutcome::Loaded(resolved(LIB, "/bin/Lib.dll")))
            .unwrap();

        assert!(is_violation(node.transition(
            LoadKind::File,
            LoadOutcome::Failed(LoadError::new("late failure"))
        )));
    }

    #[test]
    fn test_cannot_load_after_failure_on_same_kind() {
        let mut node = file_node();
        node.transition(LoadKind::File, LoadOutcome::Failed(LoadError::new("bad image")))
            .unwrap();

        assert!(!node.needs_load(LoadKind::File));
        assert_eq!(node.last_error().unwrap().message, "bad image");
        assert!(is_violation(node.transition(
            LoadKind::File,
            LoadOutcome::Loaded(resolved(LIB, "/bin/Lib.dll"))
        )));
    }

    #[test]
    fn test_cross_kind_exclusivity() {
        let mut node = name_node();
        node.transition(LoadKind::Name, LoadOutcome::Loaded(resolved(LIB, "/gac/Lib.dll")))
            .unwrap();

        // loading by name populated the file, but the node is already loaded
        assert!(is_violation(node.check_can_load(LoadKind::File)));
        assert!(is_violation(node.transition(
            LoadKind::File,
            LoadOutcome::Failed(LoadError::new("irrelevant"))
        )));
    }

    #[test]
    fn test_failure_by_name_keeps_file_kind_open() {
        let mut node = name_node();
        node.transition(LoadKind::Name, LoadOutcome::Failed(LoadError::new("missing")))
            .unwrap();
        assert!(matches!(node.status(LoadKind::Name), LoadStatus::Failed(_)));
        assert_eq!(*node.status(LoadKind::File), LoadStatus::NotAttempted);
        // no file source to try
        assert!(is_violation(node.check_can_load(LoadKind::File)));
    }

    #[test]
    fn test_resolved_rejects_invalid_name() {
        let err = Resolved::from_component(ResolvedComponent::new(", Version=1", "/x", vec![]))
            .unwrap_err();
        assert!(err.message.contains("invalid name"));
    }
}
