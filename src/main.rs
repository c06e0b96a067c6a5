//! baseline-tracker - CBO baseline comparison pipeline
//!
//! Extracts fiscal parameters from two snapshots of a parameter repository,
//! compares them year by year, and rolls them up into total revenue, total
//! spending and fiscal balance.
//!
//! Exit codes:
//!   0 - Success, documents written
//!   1 - Invalid arguments, unreadable snapshot, or malformed input

mod analysis;
mod cli;
mod config;
mod error;
mod extract;
mod models;
mod report;
mod snapshot;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use extract::Extractor;
use models::{AggregateDocument, ComparisonDocument};
use report::PendingOutput;
use snapshot::GitSnapshotSource;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // `general.verbose` feeds the log level
    let (mut config, config_source) = load_config(&args)?;
    config.merge_with_args(&args);

    init_logging(&args, &config)?;

    info!("baseline-tracker v{}", env!("CARGO_PKG_VERSION"));
    config_source.log();
    debug!("Arguments: {:?}", args);

    if let Err(e) = run_pipeline(&args, &config) {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .baseline-tracker.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to change revisions, parameter paths, and aggregates.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over the verbosity settings when set.
fn init_logging(args: &Args, config: &Config) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())
        }
        Err(_) => {
            let level = args.log_level(config.general.verbose);
            tracing::subscriber::set_global_default(builder.with_max_level(level).finish())
        }
    };

    result.context("Failed to set tracing subscriber")
}

/// Run the selected stages. Nothing is written unless every stage succeeds.
fn run_pipeline(args: &Args, config: &Config) -> Result<()> {
    let start_time = Instant::now();

    let comparison_path = config.general.comparison_path();
    let aggregate_path = config.general.aggregate_path();
    let mut outputs = Vec::new();

    // Stage 1: extraction (or reuse of a persisted comparison document)
    let comparison_json = if args.stage.extracts() {
        let comparison = extract_comparison(args, config)?;
        let json = report::render_json(&comparison)?;
        outputs.push(PendingOutput::new(comparison_path.clone(), json.clone()));
        json
    } else {
        info!("Reading comparison document: {}", comparison_path.display());
        std::fs::read_to_string(&comparison_path).with_context(|| {
            format!(
                "Failed to read comparison document {}",
                comparison_path.display()
            )
        })?
    };

    // The aggregator only ever sees the serialized document.
    let comparison = ComparisonDocument::from_json(&comparison_json)
        .context("Failed to parse comparison document")?;

    // Stage 2: aggregation
    let aggregate = if args.stage.aggregates() {
        let aggregate = aggregate_comparison(&comparison, config);
        outputs.push(PendingOutput::new(
            aggregate_path,
            report::render_json(&aggregate)?,
        ));
        Some(aggregate)
    } else {
        None
    };

    if let Some(ref summary_path) = args.summary {
        let markdown = report::generate_markdown_summary(&comparison, aggregate.as_ref());
        outputs.push(PendingOutput::new(summary_path.clone(), markdown));
    }

    report::write_outputs(&outputs)?;

    println!();
    for output in &outputs {
        println!(
            "💾 Wrote {} ({} bytes)",
            output.path.display(),
            output.content.len()
        );
    }
    println!(
        "\n✅ Done in {:.1}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}

/// Open the repository and extract the comparison document.
fn extract_comparison(args: &Args, config: &Config) -> Result<ComparisonDocument> {
    let location = args.repo.as_deref().unwrap_or_default();
    let snapshots = &config.snapshots;

    println!("📥 Opening parameter repository: {}", location);
    let source = GitSnapshotSource::from_location(location, !args.quiet)
        .with_context(|| format!("Failed to open repository: {}", location))?;
    info!("Repository at: {}", source.path().display());

    println!(
        "   Old baseline: {} ({})",
        snapshots.old_label,
        source.short_id(&snapshots.old_revision)?
    );
    println!(
        "   New baseline: {} ({})",
        snapshots.new_label,
        source.short_id(&snapshots.new_revision)?
    );

    println!("\n🔬 Extracting parameters...");
    let extractor = Extractor::new(&source, config.extract.clone(), snapshots.clone());
    let comparison = extractor.run()?;

    let registered = config.extract.parameters.len();
    println!("   Parameters: {}", comparison.parameters.len());
    if comparison.parameters.is_empty() && registered > 0 {
        warn!("No registered parameter was found at either revision");
    }

    Ok(comparison)
}

/// Compute the aggregate document and print a short summary.
fn aggregate_comparison(comparison: &ComparisonDocument, config: &Config) -> AggregateDocument {
    println!("\n📊 Computing aggregates...");
    let aggregate = analysis::Aggregator::new(config.aggregate.clone()).run(comparison);

    let years: Vec<String> = aggregate.years.iter().map(ToString::to_string).collect();
    println!("   Years: {}", years.join(", "));
    for (key, metric) in &aggregate.metrics {
        println!(
            "   - {:20} old={:2}  new={:2}  {}",
            key,
            metric.old.len(),
            metric.new.len(),
            metric.label
        );
    }

    aggregate
}

/// Where the configuration came from. Logged once tracing is up.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    BuiltIn,
    Unreadable(anyhow::Error),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE_NAME),
            ConfigSource::BuiltIn => debug!("No config file found, using defaults"),
            ConfigSource::Unreadable(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
///
/// An explicit `--config` that cannot be read is fatal; a broken default
/// file only produces a warning.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    Ok(match Config::load_default() {
        Ok(Some(config)) => (config, ConfigSource::DefaultFile),
        Ok(None) => (Config::default(), ConfigSource::BuiltIn),
        Err(e) => (Config::default(), ConfigSource::Unreadable(e)),
    })
}
