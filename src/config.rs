//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.baseline-tracker.toml` files. Every setting has a compiled-in default,
//! so the tracker runs against the CBO calibration files without any file.

use crate::models::Category;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".baseline-tracker.toml";

const CBO_CAL: &str = "policyengine_us/parameters/calibration/gov/cbo";
const CPI_DIR: &str = "policyengine_us/parameters/gov/bls/cpi";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// The two snapshots being compared.
    #[serde(default)]
    pub snapshots: SnapshotConfig,

    /// Parameters to extract.
    #[serde(default)]
    pub extract: ExtractRegistry,

    /// Aggregates to compute.
    #[serde(default)]
    pub aggregate: AggregateRegistry,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory both documents are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File name of the comparison document.
    #[serde(default = "default_comparison_file")]
    pub comparison_file: String,

    /// File name of the aggregate document.
    #[serde(default = "default_aggregate_file")]
    pub aggregate_file: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            comparison_file: default_comparison_file(),
            aggregate_file: default_aggregate_file(),
            verbose: false,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public/data")
}

fn default_comparison_file() -> String {
    "cbo_comparison.json".to_string()
}

fn default_aggregate_file() -> String {
    "aggregate_impacts.json".to_string()
}

impl GeneralConfig {
    pub fn comparison_path(&self) -> PathBuf {
        self.output_dir.join(&self.comparison_file)
    }

    pub fn aggregate_path(&self) -> PathBuf {
        self.output_dir.join(&self.aggregate_file)
    }
}

/// Revisions and display labels of the two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Git revision of the old baseline.
    #[serde(default = "default_old_revision")]
    pub old_revision: String,

    /// Git revision of the new baseline.
    #[serde(default = "default_new_revision")]
    pub new_revision: String,

    #[serde(default = "default_old_label")]
    pub old_label: String,

    #[serde(default = "default_new_label")]
    pub new_label: String,

    /// Publication backing the new baseline.
    #[serde(default = "default_source_url")]
    pub source_url: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            old_revision: default_old_revision(),
            new_revision: default_new_revision(),
            old_label: default_old_label(),
            new_label: default_new_label(),
            source_url: default_source_url(),
        }
    }
}

fn default_old_revision() -> String {
    "23e7d802b7".to_string()
}

fn default_new_revision() -> String {
    "f99b4cd80e".to_string()
}

fn default_old_label() -> String {
    "February 2024".to_string()
}

fn default_new_label() -> String {
    "February 2026".to_string()
}

fn default_source_url() -> String {
    "https://www.cbo.gov/publication/61882".to_string()
}

/// How the `values` block of a parameter file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Every dated entry counts.
    #[default]
    Flat,
    /// Only January and February entries count (CPI projection convention).
    Cpi,
}

/// A single-file parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Key in the comparison document.
    pub key: String,
    /// Path of the YAML file inside the repository.
    pub path: String,
    pub category: Category,
    /// Label used instead of the file's `metadata.label`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub mode: ParseMode,
}

impl ParameterSpec {
    fn new(key: &str, path: String, category: Category, mode: ParseMode) -> Self {
        Self {
            key: key.to_string(),
            path,
            category,
            label: None,
            mode,
        }
    }
}

/// A file whose top-level keys are each a sub-parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedSpec {
    pub path: String,
    pub category: Category,
}

/// Parameters the extractor reads, in extraction order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRegistry {
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<NestedSpec>,
}

impl Default for ExtractRegistry {
    fn default() -> Self {
        let flat = |key: &str, category| {
            ParameterSpec::new(key, format!("{}/{}.yaml", CBO_CAL, key), category, ParseMode::Flat)
        };
        let cpi = |key: &str| {
            ParameterSpec::new(key, format!("{}/{}.yaml", CPI_DIR, key), Category::Cpi, ParseMode::Cpi)
        };

        Self {
            parameters: vec![
                flat("income_tax", Category::Revenue),
                flat("payroll_taxes", Category::Revenue),
                flat("social_security", Category::Spending),
                flat("snap", Category::Spending),
                flat("ssi", Category::Spending),
                flat("unemployment_compensation", Category::Spending),
                cpi("cpi_u"),
                cpi("cpi_w"),
                cpi("c_cpi_u"),
            ],
            nested: Some(NestedSpec {
                path: format!("{}/income_by_source.yaml", CBO_CAL),
                category: Category::Income,
            }),
        }
    }
}

/// A rollup summing a list of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDefinition {
    /// Key in the aggregate document.
    pub key: String,
    pub label: String,
    pub description: String,
    /// Parameter keys summed into this aggregate.
    pub components: Vec<String>,
}

/// Revenue minus spending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceDefinition {
    pub key: String,
    pub label: String,
    pub description: String,
}

/// Aggregates the aggregator computes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRegistry {
    /// First published year.
    #[serde(default = "default_year_cutoff")]
    pub year_cutoff: u16,

    #[serde(default = "default_revenue")]
    pub revenue: AggregateDefinition,

    #[serde(default = "default_spending")]
    pub spending: AggregateDefinition,

    #[serde(default = "default_balance")]
    pub balance: BalanceDefinition,
}

impl Default for AggregateRegistry {
    fn default() -> Self {
        Self {
            year_cutoff: default_year_cutoff(),
            revenue: default_revenue(),
            spending: default_spending(),
            balance: default_balance(),
        }
    }
}

fn default_year_cutoff() -> u16 {
    2025
}

fn default_revenue() -> AggregateDefinition {
    AggregateDefinition {
        key: "total_revenue".to_string(),
        label: "Total federal revenue".to_string(),
        description: "Income tax + payroll taxes".to_string(),
        components: vec!["income_tax".to_string(), "payroll_taxes".to_string()],
    }
}

fn default_spending() -> AggregateDefinition {
    AggregateDefinition {
        key: "total_spending".to_string(),
        label: "Total mandatory spending".to_string(),
        description: "Social Security + SNAP + SSI + unemployment".to_string(),
        components: vec![
            "social_security".to_string(),
            "snap".to_string(),
            "ssi".to_string(),
            "unemployment_compensation".to_string(),
        ],
    }
}

fn default_balance() -> BalanceDefinition {
    BalanceDefinition {
        key: "fiscal_balance".to_string(),
        label: "Fiscal balance".to_string(),
        description: "Revenue minus mandatory spending".to_string(),
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref revision) = args.old {
            self.snapshots.old_revision = revision.clone();
        }
        if let Some(ref revision) = args.new {
            self.snapshots.new_revision = revision.clone();
        }
        if let Some(ref label) = args.old_label {
            self.snapshots.old_label = label.clone();
        }
        if let Some(ref label) = args.new_label {
            self.snapshots.new_label = label.clone();
        }

        if let Some(ref dir) = args.output_dir {
            self.general.output_dir = dir.clone();
        }
        if let Some(cutoff) = args.year_cutoff {
            self.aggregate.year_cutoff = cutoff;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.snapshots.old_revision, "23e7d802b7");
        assert_eq!(config.aggregate.year_cutoff, 2025);
        assert_eq!(config.extract.parameters.len(), 9);
        assert_eq!(
            config.general.comparison_path(),
            PathBuf::from("public/data/cbo_comparison.json")
        );

        let cpi: Vec<_> = config
            .extract
            .parameters
            .iter()
            .filter(|p| p.mode == ParseMode::Cpi)
            .map(|p| p.key.as_str())
            .collect();
        assert_eq!(cpi, vec!["cpi_u", "cpi_w", "c_cpi_u"]);
        assert!(config.extract.parameters[3].path.ends_with("gov/cbo/snap.yaml"));
    }

    #[test]
    fn test_verbose_setting_raises_log_level() {
        let mut config: Config = toml::from_str("[general]\nverbose = true\n").unwrap();
        let mut args = crate::cli::Args::parse_from(["baseline-tracker", "--repo", "."]);
        config.merge_with_args(&args);
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(config.general.verbose), tracing::Level::ERROR);

        let mut config = Config::default();
        args.quiet = false;
        args.verbose = true;
        config.merge_with_args(&args);
        assert!(config.general.verbose);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output_dir = "out"
verbose = true

[snapshots]
old_revision = "v1"
new_revision = "v2"

[[extract.parameters]]
key = "snap"
path = "snap.yaml"
category = "spending"
label = "SNAP benefits"

[[extract.parameters]]
key = "cpi_u"
path = "cpi_u.yaml"
category = "cpi"
mode = "cpi"

[aggregate]
year_cutoff = 2030
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output_dir, PathBuf::from("out"));
        assert_eq!(config.general.aggregate_file, "aggregate_impacts.json");
        assert!(config.general.verbose);
        assert_eq!(config.snapshots.old_revision, "v1");
        assert_eq!(config.snapshots.old_label, "February 2024");
        assert_eq!(config.extract.parameters.len(), 2);
        assert_eq!(config.extract.parameters[0].label.as_deref(), Some("SNAP benefits"));
        assert_eq!(config.extract.parameters[0].mode, ParseMode::Flat);
        assert_eq!(config.extract.parameters[1].mode, ParseMode::Cpi);
        assert!(config.extract.nested.is_none());
        assert_eq!(config.aggregate.year_cutoff, 2030);
        assert_eq!(config.aggregate.revenue.key, "total_revenue");
    }

    #[test]
    fn test_default_toml_round_trips() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[snapshots]"));
        assert!(toml_str.contains("[[extract.parameters]]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.extract.parameters, Config::default().extract.parameters);
        assert_eq!(parsed.extract.nested, Config::default().extract.nested);
        assert_eq!(parsed.aggregate.spending.components.len(), 4);
    }
}
