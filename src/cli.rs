//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// baseline-tracker - compare CBO baseline parameters across two snapshots
///
/// Reads the CBO calibration parameters from two revisions of a parameter
/// repository, writes a per-parameter comparison and an aggregate rollup
/// (total revenue, total spending, fiscal balance) as JSON.
///
/// Examples:
///   baseline-tracker --repo ../policyengine-us
///   baseline-tracker --repo https://github.com/PolicyEngine/policyengine-us.git
///   baseline-tracker --repo ../policyengine-us --old v1.0.0 --new main
///   baseline-tracker --stage aggregate --output-dir public/data
///   baseline-tracker --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Parameter repository: a local path or a git URL to clone
    ///
    /// Not required with --init-config or --stage aggregate.
    #[arg(short, long, value_name = "PATH|URL")]
    pub repo: Option<String>,

    /// Revision of the old baseline (overrides config)
    #[arg(long, value_name = "REV")]
    pub old: Option<String>,

    /// Revision of the new baseline (overrides config)
    #[arg(long, value_name = "REV")]
    pub new: Option<String>,

    /// Display label of the old baseline
    #[arg(long, value_name = "LABEL")]
    pub old_label: Option<String>,

    /// Display label of the new baseline
    #[arg(long, value_name = "LABEL")]
    pub new_label: Option<String>,

    /// Directory the JSON documents are written to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .baseline-tracker.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Which part of the pipeline to run
    #[arg(long, default_value = "all", value_name = "STAGE")]
    pub stage: Stage,

    /// First year published in the aggregate document
    #[arg(long, value_name = "YEAR")]
    pub year_cutoff: Option<u16>,

    /// Also write a Markdown summary to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .baseline-tracker.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Stage {
    /// Extract, then aggregate (default)
    #[default]
    All,
    /// Only write the comparison document
    Extract,
    /// Only aggregate an existing comparison document
    Aggregate,
}

impl Stage {
    pub fn extracts(self) -> bool {
        matches!(self, Stage::All | Stage::Extract)
    }

    pub fn aggregates(self) -> bool {
        matches!(self, Stage::All | Stage::Aggregate)
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.stage.extracts() && self.repo.as_deref().map_or(true, str::is_empty) {
            return Err("--repo is required unless running --stage aggregate".to_string());
        }

        for (flag, value) in [("--old", &self.old), ("--new", &self.new)] {
            if let Some(revision) = value {
                if revision.trim().is_empty() {
                    return Err(format!("{} must not be empty", flag));
                }
            }
        }

        if let Some(cutoff) = self.year_cutoff {
            if !(1000..=9999).contains(&cutoff) {
                return Err("Year cutoff must be a four-digit year".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the `general.verbose` setting; `--quiet` overrides it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
