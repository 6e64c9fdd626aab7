//! Analysis driver
//!
//! Registers the configured sources, drives the pending sequences through the
//! loader until nothing new resolves, then reconciles the graph into an
//! [`AnalysisReport`].

use crate::config::InputParameters;
use crate::graph::{
    DependencyGraph, GraphError, IdentityConflict, LoadKind, Node, NodeId,
};
use crate::loader::{ComponentLoader, LoadError};
use crate::reconcile::{reconcile_all, reconcile_for_main, Reconciliation};
use crate::sources::{expand_source, resolve_source, SourceError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Aggregate failures of an analysis run
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("None of the {0} registered components could be resolved")]
    NoComponentsResolved(usize),

    #[error("Main component '{component}' could not be resolved: {reason}")]
    MainUnresolved { component: String, reason: String },

    #[error("Analysis cancelled")]
    Cancelled,
}

/// Configured source that was ignored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub source: String,
    pub reason: String,
}

/// A resolved component
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentSummary {
    pub node: NodeId,
    pub component: String,
    pub location: Option<PathBuf>,
    pub loaded_via: Option<LoadKind>,
    pub direct_dependencies: usize,
    pub all_dependencies: usize,
    pub dependants: usize,
}

/// A component no loader could resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedComponent {
    pub node: NodeId,
    pub component: String,
    pub error: Option<LoadError>,
    /// Components referencing it
    pub dependants: Vec<String>,
}

/// Everything an analysis run found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub main: Option<ComponentSummary>,
    pub components: Vec<ComponentSummary>,
    pub unresolved: Vec<UnresolvedComponent>,
    pub identity_conflicts: Vec<IdentityConflict>,
    pub skipped_sources: Vec<SkippedSource>,
    pub reconciliation: Reconciliation,
}

impl AnalysisReport {
    pub fn has_warnings(&self) -> bool {
        !self.unresolved.is_empty()
            || !self.identity_conflicts.is_empty()
            || !self.skipped_sources.is_empty()
            || !self.reconciliation.warnings.is_empty()
    }
}

/// Runs analyses through one loader
pub struct Analyzer<'l> {
    loader: &'l dyn ComponentLoader,
    base_directory: PathBuf,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'l> Analyzer<'l> {
    /// Relative sources are resolved against `base_directory`.
    pub fn new(loader: &'l dyn ComponentLoader, base_directory: impl Into<PathBuf>) -> Self {
        Self {
            loader,
            base_directory: base_directory.into(),
            cancel: None,
        }
    }

    /// Stop between two resolutions once `flag` is set
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[instrument(
        name = "analysis.run",
        skip(self, params),
        fields(sources = params.components.len())
    )]
    pub fn run(&self, params: &InputParameters) -> Result<AnalysisReport, AnalysisError> {
        let (graph, skipped_sources) = self.build_graph(params)?;
        self.report(&graph, params, skipped_sources)
    }

    /// Register every source and resolve the graph to a fixed point.
    pub fn build_graph(
        &self,
        params: &InputParameters,
    ) -> Result<(DependencyGraph, Vec<SkippedSource>), AnalysisError> {
        let graph = DependencyGraph::new();
        let skipped = self.register_sources(&graph, params)?;
        info!(
            "Registered {} nodes from {} sources.",
            graph.node_count(),
            params.components.len()
        );

        self.resolve_all(&graph)?;
        info!(
            "Graph stabilized with {} nodes and {} edges.",
            graph.node_count(),
            graph.edge_count()
        );

        Ok((graph, skipped))
    }

    fn register_sources(
        &self,
        graph: &DependencyGraph,
        params: &InputParameters,
    ) -> Result<Vec<SkippedSource>, AnalysisError> {
        let mut skipped = Vec::new();

        for source in &params.components {
            for expanded in expand_source(&self.base_directory, source)? {
                if let Err(e) = graph.ensure_node_from_source(&expanded) {
                    warn!("Skipping source [{}]: {}", source, e);
                    skipped.push(SkippedSource {
                        source: source.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Some(main) = &params.main_component {
            let resolved = resolve_source(&self.base_directory, main);
            graph
                .ensure_node_from_source(&resolved)
                .map_err(|e| AnalysisError::MainUnresolved {
                    component: main.clone(),
                    reason: e.to_string(),
                })?;
        }

        for additional in &params.additional_dependencies {
            let dependant = resolve_source(&self.base_directory, &additional.dependant);
            let dependant = match graph.ensure_node_from_source(&dependant) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping additional dependant [{}]: {}", additional.dependant, e);
                    skipped.push(SkippedSource {
                        source: additional.dependant.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for dependency in &additional.dependencies {
                let resolved = resolve_source(&self.base_directory, dependency);
                match graph.ensure_node_from_source(&resolved) {
                    Ok(id) => graph.register_dependency(dependant, id)?,
                    Err(e) => {
                        warn!("Skipping additional dependency [{}]: {}", dependency, e);
                        skipped.push(SkippedSource {
                            source: dependency.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(skipped)
    }

    /// Drain the pending sequences, files first, until a pass attempts nothing.
    fn resolve_all(&self, graph: &DependencyGraph) -> Result<(), AnalysisError> {
        let mut pass = 0;
        loop {
            pass += 1;
            let mut attempted = 0;

            for kind in [LoadKind::File, LoadKind::Name] {
                for id in graph.pending(kind) {
                    self.check_cancelled()?;
                    graph.load_node(id, kind, self.loader)?;
                    attempted += 1;
                }
            }

            debug!("Resolution pass {} attempted {} loads.", pass, attempted);
            if attempted == 0 {
                return Ok(());
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), AnalysisError> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(AnalysisError::Cancelled),
            _ => Ok(()),
        }
    }

    fn report(
        &self,
        graph: &DependencyGraph,
        params: &InputParameters,
        skipped_sources: Vec<SkippedSource>,
    ) -> Result<AnalysisReport, AnalysisError> {
        let nodes = graph.nodes();
        let (loaded, unresolved): (Vec<&Node>, Vec<&Node>) =
            nodes.iter().partition(|node| node.is_loaded());

        if loaded.is_empty() {
            return Err(AnalysisError::NoComponentsResolved(nodes.len()));
        }

        let (main, reconciliation) = match &params.main_component {
            Some(source) => {
                let node = self.main_node(graph, source)?;
                (Some(summarize(graph, &node)), reconcile_for_main(graph, node.id()))
            }
            None => (None, reconcile_all(graph)),
        };

        let report = AnalysisReport {
            main,
            components: loaded.iter().map(|node| summarize(graph, node)).collect(),
            unresolved: unresolved
                .iter()
                .map(|node| UnresolvedComponent {
                    node: node.id(),
                    component: node.to_string(),
                    error: node.last_error().cloned(),
                    dependants: graph
                        .direct_dependants(node.id())
                        .into_iter()
                        .filter_map(|d| graph.node(d))
                        .map(|d| d.to_string())
                        .collect(),
                })
                .collect(),
            identity_conflicts: graph.anomalies(),
            skipped_sources,
            reconciliation,
        };

        info!(
            "{} components resolved, {} unresolved, {} redirects recommended.",
            report.components.len(),
            report.unresolved.len(),
            report.reconciliation.redirects().len()
        );
        Ok(report)
    }

    fn main_node(&self, graph: &DependencyGraph, source: &str) -> Result<Node, AnalysisError> {
        let unresolved = |reason: String| AnalysisError::MainUnresolved {
            component: source.to_string(),
            reason,
        };

        let resolved = resolve_source(&self.base_directory, source);
        let id = graph
            .find_node_from_source(&resolved)?
            .ok_or_else(|| unresolved("not registered".to_string()))?;
        let node = graph
            .node(id)
            .ok_or_else(|| unresolved("not registered".to_string()))?;

        if !node.is_loaded() {
            let reason = node
                .last_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "not loaded".to_string());
            return Err(unresolved(reason));
        }
        Ok(node)
    }
}

fn summarize(graph: &DependencyGraph, node: &Node) -> ComponentSummary {
    ComponentSummary {
        node: node.id(),
        component: node.to_string(),
        location: node.resolved().map(|r| r.location.clone()),
        loaded_via: node.loaded_via(),
        direct_dependencies: graph.direct_dependencies(node.id()).len(),
        all_dependencies: graph.all_dependencies(node.id()).len(),
        dependants: graph.direct_dependants(node.id()).len(),
    }
}

#[cfg(test)]
#[path = "analysis_tests.rs"]
mod tests;
