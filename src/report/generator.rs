//! Document persistence and Markdown summaries.
//!
//! This module renders the comparison and aggregate documents as JSON,
//! writes them atomically, and optionally produces a human-readable
//! Markdown summary of a run.

use crate::models::{AggregateDocument, AggregateMetric, ComparisonDocument, ComparisonMetadata};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// A rendered document waiting to be written.
#[derive(Debug, Clone)]
pub struct PendingOutput {
    pub path: PathBuf,
    pub content: String,
}

impl PendingOutput {
    pub fn new(path: PathBuf, content: String) -> Self {
        Self { path, content }
    }
}

/// Render a document as pretty-printed JSON.
pub fn render_json<T: Serialize>(document: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(document)?;
    json.push('\n');
    Ok(json)
}

/// Write every pending output. Called once all stages have succeeded.
///
/// Each document goes through a temporary file in its target directory, so
/// readers never see a partially written file. Every document is staged
/// before any of them is persisted, so a failure while staging leaves no
/// output behind.
pub fn write_outputs(outputs: &[PendingOutput]) -> Result<()> {
    let staged = outputs
        .iter()
        .map(|output| stage(&output.path, &output.content))
        .collect::<Result<Vec<_>>>()?;

    for (file, output) in staged.into_iter().zip(outputs) {
        commit(file, &output.path)?;
    }
    Ok(())
}

fn stage(path: &Path, content: &str) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut file = NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to stage {}", path.display()))?;
    file.as_file()
        .sync_all()
        .with_context(|| format!("Failed to stage {}", path.display()))?;

    Ok(file)
}

fn commit(file: NamedTempFile, path: &Path) -> Result<()> {
    file.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// `$1.23 T`, `-$4.50 B`, `$7.00 M`, `$950`.
pub fn format_currency(value: f64) -> String {
    let abs = value.abs();
    let sign = if value < 0.0 { "-" } else { "" };

    if abs >= 1e12 {
        format!("{}${:.2} T", sign, abs / 1e12)
    } else if abs >= 1e9 {
        format!("{}${:.2} B", sign, abs / 1e9)
    } else if abs >= 1e6 {
        format!("{}${:.2} M", sign, abs / 1e6)
    } else {
        format!("{}${}", sign, group_thousands(abs.round() as u64))
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Generate a Markdown summary of a run.
pub fn generate_markdown_summary(
    comparison: &ComparisonDocument,
    aggregate: Option<&AggregateDocument>,
) -> String {
    let mut output = String::new();

    output.push_str("# CBO Baseline Comparison\n\n");
    output.push_str(&generate_metadata_section(&comparison.metadata));

    if let Some(aggregate) = aggregate {
        output.push_str("## Aggregate Metrics\n\n");
        for (key, metric) in &aggregate.metrics {
            output.push_str(&generate_metric_section(key, metric, &aggregate.metadata.source));
        }
    }

    output.push_str(&generate_parameters_section(comparison));

    output.push_str("---\n\n");
    output.push_str("*Generated by baseline-tracker*\n");

    output
}

fn generate_metadata_section(metadata: &ComparisonMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Old baseline:** {}\n", metadata.old_baseline));
    section.push_str(&format!("- **New baseline:** {}\n", metadata.new_baseline));
    section.push_str(&format!("- **Source:** {}\n", metadata.source_url));
    section.push_str(&format!("- **Generated:** {}\n\n", metadata.generated_at));

    section
}

fn generate_metric_section(
    key: &str,
    metric: &AggregateMetric,
    metadata: &ComparisonMetadata,
) -> String {
    let mut section = String::new();

    section.push_str(&format!("### {} (`{}`)\n\n", metric.label, key));
    if !metric.description.is_empty() {
        section.push_str(&format!("*{}*\n\n", metric.description));
    }

    let years: BTreeSet<_> = metric
        .old
        .years()
        .union(&metric.new.years())
        .copied()
        .collect();
    if years.is_empty() {
        section.push_str("No data in the published window.\n\n");
        return section;
    }

    section.push_str(&format!(
        "| Year | {} | {} | Change | % Change |\n",
        metadata.old_baseline, metadata.new_baseline
    ));
    section.push_str("|:---|---:|---:|---:|---:|\n");

    for year in years {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            year,
            cell(metric.old.get(year), format_currency),
            cell(metric.new.get(year), format_currency),
            cell(metric.diff.get(year), format_currency),
            cell(metric.pct_change.get(year), format_percent),
        ));
    }
    section.push('\n');

    section
}

fn cell(value: Option<f64>, format: fn(f64) -> String) -> String {
    value.map(format).unwrap_or_else(|| "–".to_string())
}

fn generate_parameters_section(comparison: &ComparisonDocument) -> String {
    let mut section = String::new();

    section.push_str("## Parameters\n\n");
    if comparison.parameters.is_empty() {
        section.push_str("No parameters were extracted.\n\n");
        return section;
    }

    section.push_str("| Parameter | Category | Label | Old years | New years | Latest % change |\n");
    section.push_str("|:---|:---|:---|:---:|:---:|---:|\n");

    for (key, entry) in &comparison.parameters {
        let latest = entry
            .pct_change
            .iter()
            .last()
            .map(|(year, pct)| format!("{} ({})", format_percent(pct), year))
            .unwrap_or_else(|| "–".to_string());

        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {} |\n",
            key,
            entry.category,
            entry.label,
            entry.old.len(),
            entry.new.len(),
            latest
        ));
    }
    section.push('\n');

    section
}
