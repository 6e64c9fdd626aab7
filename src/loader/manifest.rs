//! Manifest-backed loader
//!
//! Resolves components described by TOML manifests instead of reading binary
//! metadata. A file source points at a manifest; by-name resolution searches
//! the probe directories for a manifest declaring that name, the way a
//! runtime probes its shared component cache.

use super::{ComponentLoader, LoadError, ResolvedComponent};
use crate::identity::SymbolicName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// On-disk description of a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentManifest {
    /// Fully qualified symbolic name
    pub name: String,

    /// Symbolic names of referenced components
    #[serde(default)]
    pub references: Vec<String>,
}

impl ComponentManifest {
    pub fn read(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoadError::new(format!("Cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| LoadError::new(format!("Invalid manifest {}: {}", path.display(), e)))
    }
}

/// Loader reading [`ComponentManifest`] files
#[derive(Debug, Default)]
pub struct ManifestLoader {
    probe_directories: Vec<PathBuf>,
    /// Name key -> manifest path, built on first by-name lookup
    index: OnceLock<HashMap<String, PathBuf>>,
}

impl ManifestLoader {
    pub fn new(probe_directories: Vec<PathBuf>) -> Self {
        Self {
            probe_directories,
            index: OnceLock::new(),
        }
    }

    pub fn probe_directories(&self) -> &[PathBuf] {
        &self.probe_directories
    }

    fn index(&self) -> &HashMap<String, PathBuf> {
        self.index.get_or_init(|| self.build_index())
    }

    fn build_index(&self) -> HashMap<String, PathBuf> {
        let mut index = HashMap::new();

        for dir in &self.probe_directories {
            let pattern = format!(
                "{}/**/*.toml",
                glob::Pattern::escape(&dir.to_string_lossy())
            );
            let Ok(entries) = glob::glob(&pattern) else {
                warn!("Cannot search probe directory {}.", dir.display());
                continue;
            };

            for path in entries.flatten() {
                let manifest = match ComponentManifest::read(&path) {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        debug!("Skipping {}: {}", path.display(), e);
                        continue;
                    }
                };
                match SymbolicName::parse(&manifest.name) {
                    Ok(name) => {
                        // first probe directory wins
                        index.entry(name.key()).or_insert(path);
                    }
                    Err(e) => debug!("Skipping {}: {}", path.display(), e),
                }
            }
        }

        debug!(
            "Indexed {} components in {} probe directories.",
            index.len(),
            self.probe_directories.len()
        );
        index
    }
}

impl ComponentLoader for ManifestLoader {
    fn resolve_by_file(&self, path: &Path) -> Result<ResolvedComponent, LoadError> {
        let manifest = ComponentManifest::read(path)?;
        Ok(ResolvedComponent::new(
            manifest.name,
            path,
            manifest.references,
        ))
    }

    fn resolve_by_name(&self, name: &SymbolicName) -> Result<ResolvedComponent, LoadError> {
        let path = self.index().get(&name.key()).ok_or_else(|| {
            LoadError::new(format!(
                "Could not locate [{}] in {} probe directories",
                name,
                self.probe_directories.len()
            ))
        })?;
        self.resolve_by_file(path)
    }
}
