//! CLI command logic - extracted for testability
//!
//! Argument parsing stays in main.rs while each command lives here.

pub mod analyze;
pub mod init;

use std::path::{Path, PathBuf};

/// Report output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Directory holding `file`; `.` for a bare file name
pub fn parent_dir(file: &Path) -> PathBuf {
    file.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir(Path::new("redirect-advisor.toml")), PathBuf::from("."));
        assert_eq!(
            parent_dir(Path::new("/work/redirect-advisor.toml")),
            PathBuf::from("/work")
        );
    }
}
