//! Builds the comparison document from two snapshots.

use super::parser::{self, SubParameterShape};
use crate::config::{ExtractRegistry, NestedSpec, ParameterSpec, SnapshotConfig};
use crate::error::TrackerError;
use crate::models::{ComparisonDocument, ComparisonMetadata, ParameterEntry};
use crate::snapshot::SnapshotSource;
use chrono::Utc;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Reads every registered parameter from the old and new revisions.
pub struct Extractor<'a> {
    source: &'a dyn SnapshotSource,
    registry: ExtractRegistry,
    snapshots: SnapshotConfig,
}

impl<'a> Extractor<'a> {
    pub fn new(
        source: &'a dyn SnapshotSource,
        registry: ExtractRegistry,
        snapshots: SnapshotConfig,
    ) -> Self {
        Self {
            source,
            registry,
            snapshots,
        }
    }

    /// Extract all parameters and stamp the document with the current time.
    pub fn run(&self) -> Result<ComparisonDocument, TrackerError> {
        let parameters = self.extract_parameters()?;

        let metadata = ComparisonMetadata {
            old_baseline: self.snapshots.old_label.clone(),
            new_baseline: self.snapshots.new_label.clone(),
            source_url: self.snapshots.source_url.clone(),
            generated_at: Utc::now().to_rfc3339(),
        };

        Ok(ComparisonDocument {
            metadata,
            parameters,
        })
    }

    /// Extract every registered parameter.
    ///
    /// Parameters missing from both revisions are left out with a warning.
    pub fn extract_parameters(&self) -> Result<BTreeMap<String, ParameterEntry>, TrackerError> {
        let mut parameters = BTreeMap::new();

        for spec in &self.registry.parameters {
            if let Some(entry) = self.extract_single(spec)? {
                insert_entry(&mut parameters, spec.key.clone(), entry);
            }
        }

        if let Some(ref nested) = self.registry.nested {
            for (key, entry) in self.extract_nested(nested)? {
                insert_entry(&mut parameters, key, entry);
            }
        }

        Ok(parameters)
    }

    fn fetch_both(&self, path: &str) -> Result<(Option<String>, Option<String>), TrackerError> {
        let old = self.source.fetch(&self.snapshots.old_revision, path)?;
        let new = self.source.fetch(&self.snapshots.new_revision, path)?;
        debug!(
            "Fetched {} (old: {}, new: {})",
            path,
            if old.is_some() { "found" } else { "missing" },
            if new.is_some() { "found" } else { "missing" },
        );
        Ok((old, new))
    }

    fn extract_single(&self, spec: &ParameterSpec) -> Result<Option<ParameterEntry>, TrackerError> {
        let (old_content, new_content) = self.fetch_both(&spec.path)?;

        if old_content.is_none() && new_content.is_none() {
            warn!("{} not found at either revision, skipping", spec.key);
            return Ok(None);
        }

        let parse = |content: Option<String>, revision: &str| match content {
            Some(text) => parser::parse_parameter(&text, spec.mode, revision, &spec.path),
            None => Ok(parser::ParsedParameter::default()),
        };
        let old = parse(old_content, &self.snapshots.old_revision)?;
        let new = parse(new_content, &self.snapshots.new_revision)?;

        let label = spec
            .label
            .clone()
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| first_non_empty(&old.label, &new.label));
        let unit = first_non_empty(&old.unit, &new.unit);

        Ok(Some(ParameterEntry::new(
            label,
            unit,
            spec.category,
            old.values,
            new.values,
        )))
    }

    fn extract_nested(
        &self,
        spec: &NestedSpec,
    ) -> Result<BTreeMap<String, ParameterEntry>, TrackerError> {
        let (old_content, new_content) = self.fetch_both(&spec.path)?;

        if old_content.is_none() && new_content.is_none() {
            warn!("{} not found at either revision, skipping", spec.path);
            return Ok(BTreeMap::new());
        }

        let parse = |content: Option<String>, revision: &str| match content {
            Some(text) => parser::parse_document(&text, revision, &spec.path),
            None => Ok(Mapping::new()),
        };
        let old_doc = parse(old_content, &self.snapshots.old_revision)?;
        let new_doc = parse(new_content, &self.snapshots.new_revision)?;

        let unit = nested_unit(&old_doc, &new_doc);

        let mut keys = parser::sub_parameter_keys(&old_doc);
        keys.extend(parser::sub_parameter_keys(&new_doc));
        keys.sort();
        keys.dedup();

        let mut results = BTreeMap::new();
        for key in keys {
            let old_shape = SubParameterShape::classify(old_doc.get(key.as_str()));
            let new_shape = SubParameterShape::classify(new_doc.get(key.as_str()));

            if old_shape.is_absent() && new_shape.is_absent() {
                warn!("{} has no usable data at either revision, skipping", key);
                continue;
            }

            let (old_values, old_label) =
                old_shape.extract(&key, &self.snapshots.old_revision, &spec.path)?;
            let (new_values, new_label) =
                new_shape.extract(&key, &self.snapshots.new_revision, &spec.path)?;

            let mut label = first_non_empty(&old_label, &new_label);
            if label.is_empty() {
                label = parser::title_case(&key);
            }

            let entry = ParameterEntry::new(label, unit.clone(), spec.category, old_values, new_values);
            results.insert(key, entry);
        }

        Ok(results)
    }
}

fn insert_entry(parameters: &mut BTreeMap<String, ParameterEntry>, key: String, entry: ParameterEntry) {
    if parameters.contains_key(&key) {
        warn!("Parameter {} defined twice, keeping the later definition", key);
    }
    info!(
        "  {:40}  category={:8}  old={:2}  new={:2}  pct_change={:2}  label={:?}",
        key,
        entry.category.to_string(),
        entry.old.len(),
        entry.new.len(),
        entry.pct_change.len(),
        entry.label
    );
    parameters.insert(key, entry);
}

/// Unit from the old file's top-level metadata, or the new file's when the
/// old one has none.
fn nested_unit(old_doc: &Mapping, new_doc: &Mapping) -> String {
    let has_metadata = |doc: &Mapping| {
        doc.get("metadata")
            .and_then(Value::as_mapping)
            .map_or(false, |meta| !meta.is_empty())
    };

    if has_metadata(old_doc) {
        parser::metadata_field(old_doc, "unit")
    } else {
        parser::metadata_field(new_doc, "unit")
    }
}

fn first_non_empty(first: &str, second: &str) -> String {
    if first.is_empty() {
        second.to_string()
    } else {
        first.to_string()
    }
}
