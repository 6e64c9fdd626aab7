//! `analyze` command

use super::{parent_dir, OutputFormat};
use colored::Colorize;
use redirect_advisor::analysis::{AnalysisReport, Analyzer};
use redirect_advisor::config::InputParameters;
use redirect_advisor::loader::ManifestLoader;
use redirect_advisor::report::{format_report_json, format_report_text};
use redirect_advisor::sources::normalize_path;
use std::path::PathBuf;
use tracing::debug;

pub fn cmd_analyze(
    input: PathBuf,
    format: OutputFormat,
    main: Option<String>,
    strict: bool,
) -> anyhow::Result<()> {
    let mut params = InputParameters::load(&input)?;
    if main.is_some() {
        params.main_component = main;
    }

    let base = normalize_path(&params.resolve_base_directory(&parent_dir(&input)));
    let probe_directories = params.resolve_probe_directories(&base);
    debug!("Base directory {:?}, probing {:?}", base, probe_directories);

    let loader = ManifestLoader::new(probe_directories);
    let report = Analyzer::new(&loader, base).run(&params)?;

    match format {
        OutputFormat::Text => print_text(&report),
        OutputFormat::Json => println!("{}", format_report_json(&report)?),
    }

    if strict && report.has_warnings() {
        anyhow::bail!("Analysis reported warnings (strict mode)");
    }

    Ok(())
}

fn print_text(report: &AnalysisReport) {
    println!("{}", format_report_text(report));

    let redirects = report.reconciliation.redirects().len();
    let summary = format!(
        "{} components, {} unresolved, {} redirects recommended",
        report.components.len(),
        report.unresolved.len(),
        redirects
    );
    if report.has_warnings() {
        println!("{} {}", "⚠".bright_yellow(), summary.yellow());
    } else {
        println!("{} {}", "✓".bright_green(), summary.green());
    }
}
