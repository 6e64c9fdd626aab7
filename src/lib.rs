// Library exports for the redirect advisor
pub mod analysis;
pub mod config;
pub mod graph;
pub mod identity;
pub mod loader;
pub mod reconcile;
pub mod report;
pub mod sources;

// Re-export key types for convenience
pub use analysis::{AnalysisError, AnalysisReport, Analyzer};
pub use config::{AdditionalDependency, InputParameters};
pub use graph::{DependencyGraph, GraphError, LoadKind, NodeId};
pub use identity::{SymbolicName, UnversionedIdentity, Version, VersionedIdentity};
pub use loader::{ComponentLoader, LoadError, ManifestLoader, MockLoader, ResolvedComponent};
pub use reconcile::{BindingRedirect, Reconciliation};
