//! Component loader capability
//!
//! The graph never reads component binaries itself. It asks a
//! [`ComponentLoader`] to resolve a file or a symbolic name into the resolved
//! name, location and declared references of the component, and records any
//! failure on the node that asked.

pub mod manifest;

pub use manifest::ManifestLoader;

use crate::identity::SymbolicName;
use crate::sources::file_key;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a component could not be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct LoadError {
    pub message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What a loader reports for a resolved component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedComponent {
    /// Fully qualified symbolic name of the component found
    pub canonical_name: String,

    /// Where the component was found
    pub location: PathBuf,

    /// Symbolic names of the components it references, in declaration order
    pub declared_references: Vec<String>,
}

impl ResolvedComponent {
    pub fn new(
        canonical_name: impl Into<String>,
        location: impl Into<PathBuf>,
        declared_references: Vec<String>,
    ) -> Self {
        Self {
            canonical_name: canonical_name.into(),
            location: location.into(),
            declared_references,
        }
    }
}

/// Resolves components by file or by symbolic name.
///
/// Implementations may block; the graph calls them outside its lock and
/// treats a panic inside them as an ordinary resolution failure. One loader
/// may be shared by threads resolving the same graph.
pub trait ComponentLoader: Send + Sync {
    fn resolve_by_file(&self, path: &Path) -> Result<ResolvedComponent, LoadError>;

    fn resolve_by_name(&self, name: &SymbolicName) -> Result<ResolvedComponent, LoadError>;
}

/// Loader with scripted responses (for testing)
#[derive(Debug, Default)]
pub struct MockLoader {
    files: HashMap<String, Result<ResolvedComponent, String>>,
    names: HashMap<String, Result<ResolvedComponent, String>>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `path` to a component with the given name and references
    pub fn add_file(&mut self, path: impl AsRef<Path>, name: &str, references: &[&str]) -> &mut Self {
        let path = path.as_ref();
        let component = ResolvedComponent::new(
            name,
            path,
            references.iter().map(|r| r.to_string()).collect(),
        );
        self.files.insert(file_key(path), Ok(component));
        self
    }

    /// Fail resolution of `path`
    pub fn add_file_failure(&mut self, path: impl AsRef<Path>, message: &str) -> &mut Self {
        self.files
            .insert(file_key(path.as_ref()), Err(message.to_string()));
        self
    }

    /// Resolve `name` to a component found at `location`
    pub fn add_name(
        &mut self,
        name: &str,
        location: impl Into<PathBuf>,
        references: &[&str],
    ) -> &mut Self {
        let component = ResolvedComponent::new(
            name,
            location,
            references.iter().map(|r| r.to_string()).collect(),
        );
        self.names.insert(Self::name_key(name), Ok(component));
        self
    }

    /// Fail resolution of `name`
    pub fn add_name_failure(&mut self, name: &str, message: &str) -> &mut Self {
        self.names
            .insert(Self::name_key(name), Err(message.to_string()));
        self
    }

    fn name_key(name: &str) -> String {
        SymbolicName::parse(name)
            .map(|n| n.key())
            .unwrap_or_else(|_| name.to_ascii_lowercase())
    }

    fn respond(
        entry: Option<&Result<ResolvedComponent, String>>,
        what: &str,
    ) -> Result<ResolvedComponent, LoadError> {
        match entry {
            Some(Ok(component)) => Ok(component.clone()),
            Some(Err(message)) => Err(LoadError::new(message.clone())),
            None => Err(LoadError::new(format!("No component registered for {}", what))),
        }
    }
}

impl ComponentLoader for MockLoader {
    fn resolve_by_file(&self, path: &Path) -> Result<ResolvedComponent, LoadError> {
        Self::respond(self.files.get(&file_key(path)), &path.display().to_string())
    }

    fn resolve_by_name(&self, name: &SymbolicName) -> Result<ResolvedComponent, LoadError> {
        Self::respond(self.names.get(&name.key()), &name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIB: &str = "Lib, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null";

    #[test]
    fn test_mock_resolves_file() {
        let mut mock = MockLoader::new();
        mock.add_file("/bin/Lib.dll", LIB, &["Core"]);

        let component = mock.resolve_by_file(Path::new("/bin/./Lib.dll")).unwrap();
        assert_eq!(component.canonical_name, LIB);
        assert_eq!(component.declared_references, vec!["Core".to_string()]);
    }

    #[test]
    fn test_mock_resolves_name_case_insensitively() {
        let mut mock = MockLoader::new();
        mock.add_name(LIB, "/gac/Lib.dll", &[]);

        let name = SymbolicName::parse("lib, Version=1.0.0.0, Culture=NEUTRAL, PublicKeyToken=null").unwrap();
        let component = mock.resolve_by_name(&name).unwrap();
        assert_eq!(component.location, PathBuf::from("/gac/Lib.dll"));
    }

    #[test]
    fn test_mock_failures() {
        let mut mock = MockLoader::new();
        mock.add_file_failure("/bin/Broken.dll", "bad image format");
        mock.add_name_failure(LIB, "not in cache");

        let err = mock.resolve_by_file(Path::new("/bin/Broken.dll")).unwrap_err();
        assert_eq!(err.to_string(), "bad image format");

        let name = SymbolicName::parse(LIB).unwrap();
        assert_eq!(mock.resolve_by_name(&name).unwrap_err().message, "not in cache");
    }

    #[test]
    fn test_mock_unknown_component() {
        let mock = MockLoader::new();
        let err = mock.resolve_by_file(Path::new("/nowhere.dll")).unwrap_err();
        assert!(err.message.contains("No component registered"));
    }
}
