//! Component Dependency Graph
//!
//! Nodes are registered from symbolic names or files, resolved lazily through
//! a [`ComponentLoader`](crate::loader::ComponentLoader), and merged when two
//! provisional nodes turn out to be the same component.
//!
//! ## Registration loop
//!
//! ```no_run
//! use redirect_advisor::graph::{DependencyGraph, LoadKind};
//! use redirect_advisor::loader::ManifestLoader;
//!
//! let graph = DependencyGraph::new();
//! let loader = ManifestLoader::default();
//! graph.ensure_node_from_source("components/app.toml")?;
//!
//! for kind in [LoadKind::File, LoadKind::Name] {
//!     for id in graph.pending(kind) {
//!         graph.load_node(id, kind, &loader)?;
//!     }
//! }
//! # Ok::<(), redirect_advisor::graph::GraphError>(())
//! ```
//!
//! Node handles are stable: a handle of a node merged away keeps resolving
//! to the survivor through [`DependencyGraph::canonical`].

pub mod node;
pub mod pending;
pub mod registry;
pub mod traversal;

pub use node::{LoadKind, LoadOutcome, LoadStatus, Node, NodeId, Resolved};
pub use pending::PendingNodes;
pub use registry::DependencyGraph;

use crate::identity::{IdentityError, VersionedIdentity};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by graph operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Component source '{0}' is not valid, it's neither a path nor a symbolic name")]
    InvalidSource(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    /// Caller bug: double load, load after failure, self-merge
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("Unknown node {0}")]
    UnknownNode(NodeId),
}

/// Same file resolved under two different identities; both nodes are kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityConflict {
    pub file: PathBuf,
    pub existing_node: NodeId,
    pub existing: VersionedIdentity,
    pub loaded_node: NodeId,
    pub loaded: VersionedIdentity,
}
