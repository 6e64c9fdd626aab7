//! Report rendering (text and JSON)

use crate::analysis::AnalysisReport;
use crate::reconcile::{BindingRedirect, GroupReconciliation};
use anyhow::Result;

fn push_section(output: &mut String, title: &str) {
    output.push_str(&format!("\n{}\n", title));
    output.push_str(&format!("{}\n", "-".repeat(title.len())));
}

fn format_redirect(label: &str, redirect: &BindingRedirect) -> String {
    let mut line = format!(
        "    {}: {}-{} -> {}",
        label, redirect.old_version_min, redirect.old_version_max, redirect.new_version
    );
    if redirect.downgrade {
        line.push_str(" (downgrade)");
    }
    if redirect.is_redundant() {
        line.push_str(" (redundant)");
    } else {
        let targets: Vec<&str> = redirect
            .apply_to
            .iter()
            .map(|d| d.component.as_str())
            .collect();
        line.push_str(&format!("\n      applies to: {}", targets.join("; ")));
    }
    line.push('\n');
    line
}

fn format_group(group: &GroupReconciliation) -> String {
    let mut output = format!("  {}\n", group.group);

    let versions: Vec<String> = group
        .members
        .iter()
        .map(|m| {
            if m.loaded {
                m.identity.version.to_string()
            } else {
                format!("{} (unresolved)", m.identity.version)
            }
        })
        .collect();
    output.push_str(&format!("    versions: {}\n", versions.join(", ")));

    if let Some(redirect) = &group.recommended {
        output.push_str(&format_redirect("recommended", redirect));
    }
    if let Some(redirect) = &group.primary {
        output.push_str(&format_redirect("primary", redirect));
    }
    if let Some(redirect) = &group.alternative {
        output.push_str(&format_redirect("alternative", redirect));
    }
    output
}

/// Format an analysis report for the terminal
pub fn format_report_text(report: &AnalysisReport) -> String {
    let mut output = String::new();
    output.push_str("Binding Redirect Analysis\n");
    output.push_str("=========================\n\n");

    if let Some(main) = &report.main {
        output.push_str(&format!("Main component: {}\n", main.component));
        output.push_str(&format!(
            "  {} direct, {} total dependencies\n",
            main.direct_dependencies, main.all_dependencies
        ));
    }
    output.push_str(&format!(
        "Components: {} resolved, {} unresolved\n",
        report.components.len(),
        report.unresolved.len()
    ));

    push_section(&mut output, "Resolved components");
    for component in &report.components {
        match &component.location {
            Some(location) => output.push_str(&format!(
                "  {}\n    at {}\n",
                component.component,
                location.display()
            )),
            None => output.push_str(&format!("  {}\n", component.component)),
        }
    }

    if !report.unresolved.is_empty() {
        push_section(&mut output, "Unresolved components");
        for unresolved in &report.unresolved {
            output.push_str(&format!("  {}\n", unresolved.component));
            if let Some(error) = &unresolved.error {
                output.push_str(&format!("    error: {}\n", error));
            }
            if !unresolved.dependants.is_empty() {
                output.push_str(&format!(
                    "    referenced by: {}\n",
                    unresolved.dependants.join("; ")
                ));
            }
        }
    }

    if !report.identity_conflicts.is_empty() {
        push_section(&mut output, "Identity conflicts");
        for conflict in &report.identity_conflicts {
            output.push_str(&format!(
                "  {}\n    {} vs {}\n",
                conflict.file.display(),
                conflict.existing,
                conflict.loaded
            ));
        }
    }

    if !report.skipped_sources.is_empty() {
        push_section(&mut output, "Skipped sources");
        for skipped in &report.skipped_sources {
            output.push_str(&format!("  '{}': {}\n", skipped.source, skipped.reason));
        }
    }

    push_section(&mut output, "Binding redirects");
    if report.reconciliation.groups.is_empty() {
        output.push_str("  No version conflicts found.\n");
    }
    for group in &report.reconciliation.groups {
        output.push_str(&format_group(group));
    }

    if !report.reconciliation.warnings.is_empty() {
        push_section(&mut output, "Warnings");
        for warning in &report.reconciliation.warnings {
            output.push_str(&format!("  ⚠ {}\n", warning));
        }
    }

    output
}

/// Format an analysis report as JSON
pub fn format_report_json(report: &AnalysisReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
