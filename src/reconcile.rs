//! Version reconciliation
//!
//! Groups nodes by unversioned identity and recommends binding redirects so
//! that every component referencing a group ends up on one version.

use crate::graph::{DependencyGraph, Node, NodeId};
use crate::identity::{UnversionedIdentity, Version, VersionedIdentity};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// Component a redirect has to be applied to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependant {
    pub node: NodeId,
    pub component: String,
}

impl From<&Node> for Dependant {
    fn from(node: &Node) -> Self {
        Self {
            node: node.id(),
            component: node.to_string(),
        }
    }
}

/// Rule routing a range of old versions of a group to one new version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingRedirect {
    pub group: UnversionedIdentity,
    pub old_version_min: Version,
    pub old_version_max: Version,
    pub new_version: Version,
    /// The target is lower than versions some callers asked for
    pub downgrade: bool,
    /// Dependants of the group members whose version differs from the target
    pub apply_to: Vec<Dependant>,
}

impl BindingRedirect {
    fn new(
        group: &UnversionedIdentity,
        old_version_max: Version,
        new_version: Version,
        members: &[GroupMember],
    ) -> Self {
        let apply_to: BTreeMap<NodeId, Dependant> = members
            .iter()
            .filter(|m| m.identity.version != new_version)
            .flat_map(|m| m.dependants.iter())
            .map(|d| (d.node, d.clone()))
            .collect();

        Self {
            group: group.clone(),
            old_version_min: Version::ZERO,
            old_version_max,
            new_version,
            downgrade: new_version < old_version_max,
            apply_to: apply_to.into_values().collect(),
        }
    }

    /// No component would be affected by applying it
    pub fn is_redundant(&self) -> bool {
        self.apply_to.is_empty()
    }
}

impl fmt::Display for BindingRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: oldVersion={}-{} newVersion={}",
            self.group, self.old_version_min, self.old_version_max, self.new_version
        )
    }
}

/// Conditions worth a reviewer's attention
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileWarning {
    /// No member of the group could be resolved
    UnresolvedGroup { group: UnversionedIdentity },

    /// The recommended target is older than a requested version
    DowngradingRedirect {
        group: UnversionedIdentity,
        requested: Version,
        target: Version,
    },

    /// What dependants ask for is not what is present
    ReferencedLoadedMismatch {
        group: UnversionedIdentity,
        highest_referenced: Version,
        highest_loaded: Version,
    },
}

impl fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileWarning::UnresolvedGroup { group } => {
                write!(f, "no version of [{}] could be resolved", group)
            }
            ReconcileWarning::DowngradingRedirect {
                group,
                requested,
                target,
            } => write!(
                f,
                "redirect of [{}] downgrades {} to {}",
                group, requested, target
            ),
            ReconcileWarning::ReferencedLoadedMismatch {
                group,
                highest_referenced,
                highest_loaded,
            } => write!(
                f,
                "[{}] is referenced up to {} but only {} is present",
                group, highest_referenced, highest_loaded
            ),
        }
    }
}

/// One version of a group, as found in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMember {
    pub node: NodeId,
    pub identity: VersionedIdentity,
    pub loaded: bool,
    pub location: Option<PathBuf>,
    pub dependants: Vec<Dependant>,
}

/// Outcome for one reconciliation group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReconciliation {
    pub group: UnversionedIdentity,
    /// Members in ascending version order
    pub members: Vec<GroupMember>,
    pub highest_version: Version,
    pub highest_loaded_version: Option<Version>,
    pub highest_referenced_version: Option<Version>,
    /// `[0.0.0.0 - highest_version] -> highest_loaded_version`
    pub recommended: Option<BindingRedirect>,
    /// Set when the referenced and loaded versions disagree
    pub primary: Option<BindingRedirect>,
    /// Redirect to the loaded version when it is not the primary target
    pub alternative: Option<BindingRedirect>,
}

impl GroupReconciliation {
    /// Every redirect of this group, without duplicates
    pub fn redirects(&self) -> Vec<&BindingRedirect> {
        let mut redirects: Vec<&BindingRedirect> = Vec::new();
        for redirect in [&self.recommended, &self.primary, &self.alternative]
            .into_iter()
            .flatten()
        {
            if !redirects.contains(&redirect) {
                redirects.push(redirect);
            }
        }
        redirects
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub groups: Vec<GroupReconciliation>,
    pub warnings: Vec<ReconcileWarning>,
}

impl Reconciliation {
    pub fn redirects(&self) -> Vec<&BindingRedirect> {
        self.groups.iter().flat_map(|g| g.redirects()).collect()
    }

    pub fn group(&self, name: &str) -> Option<&GroupReconciliation> {
        self.groups
            .iter()
            .find(|g| g.group.name().eq_ignore_ascii_case(name))
    }
}

/// Reconcile the groups formed by `nodes`.
///
/// Nodes without a known identity (unresolved file nodes) cannot belong to a
/// group and are ignored, as are groups with a single member.
pub fn reconcile(graph: &DependencyGraph, nodes: &BTreeSet<NodeId>) -> Reconciliation {
    let mut groups: BTreeMap<UnversionedIdentity, Vec<GroupMember>> = BTreeMap::new();
    let mut seen = HashSet::new();

    for &id in nodes {
        let Some(node) = graph.node(id) else {
            continue;
        };
        if !seen.insert(node.id()) {
            continue;
        }
        let Some(identity) = node.identity().cloned() else {
            continue;
        };

        let dependants = graph
            .direct_dependants(node.id())
            .into_iter()
            .filter_map(|d| graph.node(d))
            .map(|d| Dependant::from(&d))
            .collect();

        groups
            .entry(identity.unversioned.clone())
            .or_default()
            .push(GroupMember {
                node: node.id(),
                identity,
                loaded: node.is_loaded(),
                location: node.resolved().map(|r| r.location.clone()),
                dependants,
            });
    }

    let mut reconciliation = Reconciliation::default();
    for (group, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort_by(|a, b| a.identity.version.cmp(&b.identity.version));
        let outcome = reconcile_group(group, members, &mut reconciliation.warnings);
        reconciliation.groups.push(outcome);
    }

    info!(
        "Reconciled {} groups, {} redirects, {} warnings.",
        reconciliation.groups.len(),
        reconciliation.redirects().len(),
        reconciliation.warnings.len()
    );
    reconciliation
}

/// Reconcile everything `main` depends on, plus the sibling versions of
/// every group it touches.
pub fn reconcile_for_main(graph: &DependencyGraph, main: NodeId) -> Reconciliation {
    reconcile(graph, &graph.all_dependencies_including_group(main))
}

/// Reconcile every node of the graph
pub fn reconcile_all(graph: &DependencyGraph) -> Reconciliation {
    reconcile(graph, &graph.node_ids().into_iter().collect())
}

fn max_version<'a>(members: impl Iterator<Item = &'a GroupMember>) -> Option<Version> {
    members.map(|m| m.identity.version).max()
}

fn reconcile_group(
    group: UnversionedIdentity,
    members: Vec<GroupMember>,
    warnings: &mut Vec<ReconcileWarning>,
) -> GroupReconciliation {
    let highest_version = max_version(members.iter()).unwrap_or(Version::ZERO);
    let highest_loaded_version = max_version(members.iter().filter(|m| m.loaded));
    let highest_referenced_version =
        max_version(members.iter().filter(|m| !m.dependants.is_empty()));

    let mut result = GroupReconciliation {
        group,
        members,
        highest_version,
        highest_loaded_version,
        highest_referenced_version,
        recommended: None,
        primary: None,
        alternative: None,
    };

    let Some(loaded) = highest_loaded_version else {
        warn!(
            "No version of [{}] could be resolved, no redirect recommended.",
            result.group
        );
        warnings.push(ReconcileWarning::UnresolvedGroup {
            group: result.group.clone(),
        });
        return result;
    };

    let recommended =
        BindingRedirect::new(&result.group, highest_version, loaded, &result.members);
    if recommended.downgrade {
        warn!(
            "Redirect of [{}] downgrades {} to {}.",
            result.group, highest_version, loaded
        );
        warnings.push(ReconcileWarning::DowngradingRedirect {
            group: result.group.clone(),
            requested: highest_version,
            target: loaded,
        });
    }
    result.recommended = Some(recommended);

    if let Some(referenced) = highest_referenced_version.filter(|v| *v != loaded) {
        warn!(
            "[{}] is referenced up to {} but the highest version present is {}.",
            result.group, referenced, loaded
        );
        warnings.push(ReconcileWarning::ReferencedLoadedMismatch {
            group: result.group.clone(),
            highest_referenced: referenced,
            highest_loaded: loaded,
        });

        let target = referenced.max(loaded);
        result.primary = Some(BindingRedirect::new(
            &result.group,
            highest_version,
            target,
            &result.members,
        ));
        if target != loaded {
            // covers the versions the primary redirect targets, no further
            result.alternative = Some(BindingRedirect::new(
                &result.group,
                target,
                loaded,
                &result.members,
            ));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LoadKind;
    use crate::identity::SymbolicName;
    use crate::loader::MockLoader;
    use std::path::Path;

    const APP: &str = "App, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null";
    const PLUGIN: &str = "Plugin, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null";
    const LIB1: &str = "Lib, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null";
    const LIB2: &str = "Lib, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null";

    fn resolve(graph: &DependencyGraph, loader: &MockLoader) {
        loop {
            let mut attempted = 0;
            for kind in [LoadKind::File, LoadKind::Name] {
                for id in graph.pending(kind) {
                    graph.load_node(id, kind, loader).unwrap();
                    attempted += 1;
                }
            }
            if attempted == 0 {
                break;
            }
        }
    }

    fn version(text: &str) -> Version {
        text.parse().unwrap()
    }

    /// App refs Lib 2.0 (missing), Plugin refs Lib 1.0 (present)
    fn downgrade_scenario() -> (DependencyGraph, NodeId) {
        let graph = DependencyGraph::new();
        let mut loader = MockLoader::new();
        loader
            .add_file("/bin/App.dll", APP, &[LIB2])
            .add_file("/bin/Plugin.dll", PLUGIN, &[LIB1])
            .add_file("/bin/Lib.dll", LIB1, &[])
            .add_name_failure(LIB2, "not found");

        let app = graph.ensure_node_by_file(Path::new("/bin/App.dll"));
        graph.ensure_node_by_file(Path::new("/bin/Plugin.dll"));
        graph.ensure_node_by_file(Path::new("/bin/Lib.dll"));
        resolve(&graph, &loader);
        (graph, app)
    }

    #[test]
    fn test_downgrade_scenario() {
        let (graph, _) = downgrade_scenario();
        let reconciliation = reconcile_all(&graph);

        assert_eq!(reconciliation.groups.len(), 1);
        let lib = reconciliation.group("lib").unwrap();
        assert_eq!(lib.members.len(), 2);
        assert_eq!(lib.highest_version, version("2.0.0.0"));
        assert_eq!(lib.highest_loaded_version, Some(version("1.0.0.0")));

        let recommended = lib.recommended.as_ref().unwrap();
        assert_eq!(recommended.old_version_min, Version::ZERO);
        assert_eq!(recommended.old_version_max, version("2.0.0.0"));
        assert_eq!(recommended.new_version, version("1.0.0.0"));
        assert!(recommended.downgrade);
        assert_eq!(recommended.apply_to.len(), 1);
        assert_eq!(recommended.apply_to[0].component, APP);

        assert!(reconciliation.warnings.iter().any(|w| matches!(
            w,
            ReconcileWarning::DowngradingRedirect { .. }
        )));
    }

    #[test]
    fn test_referenced_loaded_mismatch_keeps_both_redirects() {
        let (graph, _) = downgrade_scenario();
        let reconciliation = reconcile_all(&graph);
        let lib = reconciliation.group("Lib").unwrap();

        assert_eq!(lib.highest_referenced_version, Some(version("2.0.0.0")));
        let primary = lib.primary.as_ref().unwrap();
        assert_eq!(primary.new_version, version("2.0.0.0"));
        assert!(!primary.downgrade);
        assert_eq!(primary.apply_to[0].component, PLUGIN);

        let alternative = lib.alternative.as_ref().unwrap();
        assert_eq!(alternative.new_version, version("1.0.0.0"));

        // the alternative coincides with the recommended redirect
        assert_eq!(lib.redirects().len(), 2);
        assert!(reconciliation.warnings.iter().any(|w| matches!(
            w,
            ReconcileWarning::ReferencedLoadedMismatch { .. }
        )));
    }

    #[test]
    fn test_alternative_range_ends_at_primary_target() {
        const LIB3: &str = "Lib, Version=3.0.0.0, Culture=neutral, PublicKeyToken=null";
        let graph = DependencyGraph::new();
        let mut loader = MockLoader::new();
        loader
            .add_file("/bin/App.dll", APP, &[LIB2])
            .add_file("/bin/Plugin.dll", PLUGIN, &[LIB1])
            .add_file("/bin/Lib.dll", LIB1, &[])
            .add_name_failure(LIB2, "not found")
            .add_name_failure(LIB3, "not found");
        graph.ensure_node_by_file(Path::new("/bin/App.dll"));
        graph.ensure_node_by_file(Path::new("/bin/Plugin.dll"));
        graph.ensure_node_by_file(Path::new("/bin/Lib.dll"));
        graph.ensure_node_by_name(&SymbolicName::parse(LIB3).unwrap());
        resolve(&graph, &loader);

        let reconciliation = reconcile_all(&graph);
        let lib = reconciliation.group("Lib").unwrap();
        assert_eq!(lib.highest_version, version("3.0.0.0"));

        let primary = lib.primary.as_ref().unwrap();
        assert_eq!(primary.old_version_max, version("3.0.0.0"));
        assert_eq!(primary.new_version, version("2.0.0.0"));

        let alternative = lib.alternative.as_ref().unwrap();
        assert_eq!(alternative.old_version_max, version("2.0.0.0"));
        assert_eq!(alternative.new_version, version("1.0.0.0"));
        assert_ne!(Some(alternative), lib.recommended.as_ref());
        assert_eq!(lib.redirects().len(), 3);
    }

    #[test]
    fn test_reconcile_for_main_matches_scenario() {
        let (graph, app) = downgrade_scenario();
        let reconciliation = reconcile_for_main(&graph, app);

        let lib = reconciliation.group("Lib").unwrap();
        assert_eq!(lib.members.len(), 2);
        assert_eq!(
            lib.recommended.as_ref().unwrap().new_version,
            version("1.0.0.0")
        );
    }

    #[test]
    fn test_upgrade_without_mismatch() {
        let graph = DependencyGraph::new();
        let mut loader = MockLoader::new();
        loader
            .add_file("/bin/App.dll", APP, &[LIB2])
            .add_file("/bin/Plugin.dll", PLUGIN, &[LIB1])
            .add_name(LIB1, "/gac/Lib1.dll", &[])
            .add_name(LIB2, "/gac/Lib2.dll", &[]);
        graph.ensure_node_by_file(Path::new("/bin/App.dll"));
        graph.ensure_node_by_file(Path::new("/bin/Plugin.dll"));
        resolve(&graph, &loader);

        let reconciliation = reconcile_all(&graph);
        let lib = reconciliation.group("Lib").unwrap();
        let recommended = lib.recommended.as_ref().unwrap();

        assert_eq!(recommended.new_version, version("2.0.0.0"));
        assert!(!recommended.downgrade);
        assert_eq!(recommended.apply_to[0].component, PLUGIN);
        assert!(lib.primary.is_none());
        assert!(lib.alternative.is_none());
        assert!(reconciliation.warnings.is_empty());
    }

    #[test]
    fn test_unresolved_group_recommends_nothing() {
        let graph = DependencyGraph::new();
        let mut loader = MockLoader::new();
        loader
            .add_file("/bin/App.dll", APP, &[LIB1, LIB2])
            .add_name_failure(LIB1, "missing")
            .add_name_failure(LIB2, "missing");
        graph.ensure_node_by_file(Path::new("/bin/App.dll"));
        resolve(&graph, &loader);

        let reconciliation = reconcile_all(&graph);
        let lib = reconciliation.group("Lib").unwrap();
        assert!(lib.recommended.is_none());
        assert!(lib.redirects().is_empty());
        assert_eq!(
            reconciliation.warnings,
            vec![ReconcileWarning::UnresolvedGroup {
                group: lib.group.clone()
            }]
        );
    }

    #[test]
    fn test_redundant_redirect() {
        let graph = DependencyGraph::new();
        let mut loader = MockLoader::new();
        loader
            .add_file("/bin/App.dll", APP, &[LIB2])
            .add_file("/bin/Lib1.dll", LIB1, &[])
            .add_file("/bin/Lib2.dll", LIB2, &[]);
        for file in ["/bin/App.dll", "/bin/Lib1.dll", "/bin/Lib2.dll"] {
            graph.ensure_node_by_file(Path::new(file));
        }
        resolve(&graph, &loader);

        let reconciliation = reconcile_all(&graph);
        let recommended = reconciliation.group("Lib").unwrap().recommended.clone().unwrap();
        assert_eq!(recommended.new_version, version("2.0.0.0"));
        assert!(recommended.is_redundant());
    }

    #[test]
    fn test_single_member_groups_are_skipped() {
        let graph = DependencyGraph::new();
        let mut loader = MockLoader::new();
        loader
            .add_file("/bin/App.dll", APP, &[LIB1])
            .add_name(LIB1, "/gac/Lib.dll", &[]);
        graph.ensure_node_by_file(Path::new("/bin/App.dll"));
        resolve(&graph, &loader);

        let reconciliation = reconcile_all(&graph);
        assert!(reconciliation.groups.is_empty());
        assert!(reconciliation.redirects().is_empty());
    }

    #[test]
    fn test_redirect_display() {
        let (graph, _) = downgrade_scenario();
        let reconciliation = reconcile_all(&graph);
        let text = reconciliation.group("Lib").unwrap().recommended.as_ref().unwrap().to_string();
        assert_eq!(
            text,
            "Lib, Culture=neutral, PublicKeyToken=null: oldVersion=0.0.0.0-2.0.0.0 newVersion=1.0.0.0"
        );
    }
}
