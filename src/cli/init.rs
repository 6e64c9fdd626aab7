//! `init` command

use colored::Colorize;
use redirect_advisor::config::{InputParameters, DEFAULT_INPUT_FILENAME};
use std::path::{Path, PathBuf};

/// Write a starter input file into `path`, returning where it went.
pub fn write_input_file(path: &Path, force: bool) -> anyhow::Result<PathBuf> {
    let file = path.join(DEFAULT_INPUT_FILENAME);
    if file.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            file.display()
        );
    }

    std::fs::create_dir_all(path)?;
    InputParameters::sample().save(&file)?;
    Ok(file)
}

pub fn cmd_init(path: PathBuf, force: bool) -> anyhow::Result<()> {
    let file = write_input_file(&path, force)?;

    println!(
        "{} Created input file: {}",
        "✓".bright_green(),
        file.display()
    );
    println!();
    println!("Next steps:");
    println!("  1. List your component manifests under 'components'");
    println!("  2. Point 'probe_directories' at shared components");
    println!(
        "  3. Run: {}",
        format!("redirect-advisor analyze {}", file.display()).cyan()
    );

    Ok(())
}
