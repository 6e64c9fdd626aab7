use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the input file
pub const DEFAULT_INPUT_FILENAME: &str = "redirect-advisor.toml";

/// Input of an analysis run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputParameters {
    /// Component whose dependency tree is reconciled.
    /// Either a file path or a fully qualified symbolic name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_component: Option<String>,

    /// Directory relative sources resolve against; relative to the input file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<PathBuf>,

    /// Components to load: file paths, glob patterns or symbolic names
    pub components: Vec<String>,

    /// Directories searched when resolving by name
    pub probe_directories: Vec<PathBuf>,

    /// Dependencies not declared by the components but to be considered
    pub additional_dependencies: Vec<AdditionalDependency>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalDependency {
    /// File path or symbolic name of the depending component
    pub dependant: String,

    /// File paths or symbolic names it depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl InputParameters {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let params = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(params)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Base directory resolved against the directory of the input file
    pub fn resolve_base_directory(&self, input_dir: &Path) -> PathBuf {
        match &self.base_directory {
            Some(base) if base.is_absolute() => base.clone(),
            Some(base) => input_dir.join(base),
            None => input_dir.to_path_buf(),
        }
    }

    /// Probe directories resolved against `base`
    pub fn resolve_probe_directories(&self, base: &Path) -> Vec<PathBuf> {
        self.probe_directories
            .iter()
            .map(|dir| {
                if dir.is_absolute() {
                    dir.clone()
                } else {
                    base.join(dir)
                }
            })
            .collect()
    }

    /// Starting point written by `init`
    pub fn sample() -> Self {
        Self {
            main_component: Some("components/app.toml".to_string()),
            base_directory: Some(PathBuf::from(".")),
            components: vec!["components/*.toml".to_string()],
            probe_directories: vec![PathBuf::from("probe")],
            additional_dependencies: Vec::new(),
        }
    }
}
