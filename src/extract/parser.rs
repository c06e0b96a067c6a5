//! YAML parameter file parsing.
//!
//! Parameter files keep their data under a `values` mapping keyed by date
//! (`2025-01-01: 123`), optionally wrapping a value as `{value: 123, ...}`,
//! and carry `metadata.label` / `metadata.unit`. The nested income file
//! instead holds one such block per top-level key, in one of two shapes.

use crate::config::ParseMode;
use crate::error::TrackerError;
use crate::models::{TimeSeries, Year};
use serde_yaml::{Mapping, Value};
use tracing::debug;

/// Top-level keys of the nested file that are not sub-parameters.
pub const RESERVED_KEYS: [&str; 2] = ["description", "metadata"];

/// Values and display metadata read from one snapshot of a parameter file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedParameter {
    pub values: TimeSeries,
    pub label: String,
    pub unit: String,
}

/// Parse a YAML document whose top level must be a mapping.
///
/// An empty document is treated as an empty mapping.
pub fn parse_document(content: &str, revision: &str, path: &str) -> Result<Mapping, TrackerError> {
    let value: Value = serde_yaml::from_str(content)
        .map_err(|e| TrackerError::malformed(revision, path, e))?;

    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(TrackerError::malformed(
            revision,
            path,
            "top level is not a mapping",
        )),
    }
}

/// Parse a single-parameter file.
pub fn parse_parameter(
    content: &str,
    mode: ParseMode,
    revision: &str,
    path: &str,
) -> Result<ParsedParameter, TrackerError> {
    let doc = parse_document(content, revision, path)?;

    let values = match doc.get("values") {
        None | Some(Value::Null) => TimeSeries::new(),
        Some(Value::Mapping(raw)) => parse_values(raw, mode),
        Some(_) => {
            return Err(TrackerError::malformed(
                revision,
                path,
                "`values` is not a mapping",
            ))
        }
    };

    Ok(ParsedParameter {
        values,
        label: metadata_field(&doc, "label"),
        unit: metadata_field(&doc, "unit"),
    })
}

/// Reduce a date-keyed mapping to one value per year.
///
/// Keys are visited in ascending order and a later date overwrites an
/// earlier one in the same year, so the last date of each year wins. In
/// CPI mode only January and February dates are kept, each under its own
/// calendar year.
pub fn parse_values(raw: &Mapping, mode: ParseMode) -> TimeSeries {
    let mut entries: Vec<(String, &Value)> = raw
        .iter()
        .filter_map(|(key, value)| key_string(key).map(|k| (k, value)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    entries
        .into_iter()
        .filter(|(key, _)| mode == ParseMode::Flat || is_cpi_month(key))
        .filter_map(|(key, value)| {
            let Some(year) = Year::from_date_key(&key) else {
                debug!("Skipping non-date key {:?}", key);
                return None;
            };
            numeric_value(value).map(|v| (year, v))
        })
        .collect()
}

/// A sub-parameter of the nested file, classified by shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubParameterShape<'a> {
    /// `{metadata: {label: ...}, values: {date: value, ...}}`
    Structured(&'a Mapping),
    /// `{date: value, ..., metadata: {...}}`, values possibly wrapped.
    Flat(&'a Mapping),
    /// Missing, or not a mapping.
    Absent,
}

impl<'a> SubParameterShape<'a> {
    /// Decide the shape of a top-level node of the nested file.
    pub fn classify(node: Option<&'a Value>) -> Self {
        match node {
            Some(Value::Mapping(sub)) if sub.contains_key("values") => Self::Structured(sub),
            Some(Value::Mapping(sub)) => Self::Flat(sub),
            _ => Self::Absent,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Values and label (empty when absent).
    ///
    /// A structured sub-parameter whose `values` is not a mapping is
    /// malformed, as it is in a single-parameter file.
    pub fn extract(
        &self,
        key: &str,
        revision: &str,
        path: &str,
    ) -> Result<(TimeSeries, String), TrackerError> {
        let extracted = match self {
            Self::Structured(sub) => {
                let values = match sub.get("values") {
                    None | Some(Value::Null) => TimeSeries::new(),
                    Some(Value::Mapping(raw)) => parse_values(raw, ParseMode::Flat),
                    Some(_) => {
                        return Err(TrackerError::malformed(
                            revision,
                            path,
                            format!("`{}.values` is not a mapping", key),
                        ))
                    }
                };
                (values, metadata_field(sub, "label"))
            }
            Self::Flat(sub) => {
                let dated: Mapping = sub
                    .iter()
                    .filter(|(key, _)| key.as_str() != Some("metadata"))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                (parse_values(&dated, ParseMode::Flat), metadata_field(sub, "label"))
            }
            Self::Absent => (TimeSeries::new(), String::new()),
        };
        Ok(extracted)
    }
}

/// Sub-parameter keys of a nested document, sorted.
pub fn sub_parameter_keys(doc: &Mapping) -> Vec<String> {
    let mut keys: Vec<String> = doc
        .keys()
        .filter_map(key_string)
        .filter(|key| !RESERVED_KEYS.contains(&key.as_str()))
        .collect();
    keys.sort();
    keys
}

/// `metadata.<field>` as a string, or empty.
pub fn metadata_field(node: &Mapping, field: &str) -> String {
    node.get("metadata")
        .and_then(Value::as_mapping)
        .and_then(|meta| meta.get(field))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// `wages_and_salaries` -> `Wages And Salaries`.
pub fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut prev_alpha = false;

    for c in key.replace('_', " ").chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
        } else {
            out.push(c);
        }
        prev_alpha = c.is_alphabetic();
    }

    out
}

fn key_string(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_cpi_month(key: &str) -> bool {
    matches!(key.split('-').nth(1), Some("01") | Some("02"))
}

/// A bare number, or the numeric `value` of a wrapper mapping.
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => underscored_number(s),
        Value::Mapping(wrapper) => wrapper.get("value").and_then(numeric_value_bare),
        _ => None,
    }
}

fn numeric_value_bare(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => underscored_number(s),
        _ => None,
    }
}

/// Parameter files use YAML 1.1 digit grouping (`9_033_840_000_000`),
/// which a YAML 1.2 parser hands back as a string.
fn underscored_number(raw: &str) -> Option<f64> {
    if !raw.contains('_') {
        return None;
    }
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    let numeric = cleaned.bytes().any(|b| b.is_ascii_digit())
        && cleaned
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if numeric {
        cleaned.parse().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const SNAP: &str = include_str!("../../fixtures/snap.yaml");
    const CPI_U: &str = include_str!("../../fixtures/cpi_u.yaml");
    const INCOME: &str = include_str!("../../fixtures/income_by_source.yaml");

    fn y(year: u16) -> Year {
        Year::new(year).unwrap()
    }

    fn years(list: &[u16]) -> BTreeSet<Year> {
        list.iter().map(|year| y(*year)).collect()
    }

    #[test]
    fn test_parse_flat_parameter() {
        let parsed = parse_parameter(SNAP, ParseMode::Flat, "old", "snap.yaml").unwrap();

        assert_eq!(parsed.label, "SNAP benefits");
        assert_eq!(parsed.unit, "currency-USD");
        assert_eq!(parsed.values.get(y(2024)), Some(100_000_000_000.0));
        assert_eq!(parsed.values.get(y(2025)), Some(105_000_000_000.0));
        assert_eq!(parsed.values.get(y(2027)), Some(0.0));
        assert_eq!(parsed.values.len(), 4);
    }

    #[test]
    fn test_last_date_in_a_year_wins() {
        // 2026-01-01 (wrapped) and 2026-07-01 both map to 2026.
        let parsed = parse_parameter(SNAP, ParseMode::Flat, "old", "snap.yaml").unwrap();
        assert_eq!(parsed.values.get(y(2026)), Some(109_000_000_000.0));

        // Document order does not matter, only key order.
        let reordered = "values:\n  2026-07-01: 2\n  2026-01-01: 1\n";
        let parsed = parse_parameter(reordered, ParseMode::Flat, "old", "x.yaml").unwrap();
        assert_eq!(parsed.values.get(y(2026)), Some(2.0));
    }

    #[test]
    fn test_cpi_mode_keeps_only_january_and_february() {
        let parsed = parse_parameter(CPI_U, ParseMode::Cpi, "new", "cpi_u.yaml").unwrap();

        assert_eq!(parsed.label, "CPI-U");
        assert_eq!(parsed.values.years(), years(&[2024, 2025]));
        // 2024-02-01 is the last retained 2024 date; later months are ignored.
        assert_eq!(parsed.values.get(y(2024)), Some(309.7));
        assert_eq!(parsed.values.get(y(2025)), Some(317.7));
    }

    #[test]
    fn test_cpi_february_keeps_its_own_year() {
        // February entries project the following year but stay under their
        // literal calendar year.
        let content = "values:\n  2030-02-01: 400.0\n  2030-03-01: 401.0\n";
        let parsed = parse_parameter(content, ParseMode::Cpi, "new", "cpi.yaml").unwrap();
        assert_eq!(parsed.values.get(y(2030)), Some(400.0));
        assert_eq!(parsed.values.get(y(2031)), None);
    }

    #[test]
    fn test_flat_mode_keeps_all_months() {
        let parsed = parse_parameter(CPI_U, ParseMode::Flat, "new", "cpi_u.yaml").unwrap();
        assert_eq!(parsed.values.get(y(2024)), Some(315.0));
        assert_eq!(parsed.values.get(y(2025)), Some(322.9));
    }

    #[test]
    fn test_missing_values_and_metadata() {
        let parsed = parse_parameter("description: nothing yet\n", ParseMode::Flat, "old", "x.yaml")
            .unwrap();
        assert!(parsed.values.is_empty());
        assert_eq!(parsed.label, "");
        assert_eq!(parsed.unit, "");

        let parsed = parse_parameter("", ParseMode::Flat, "old", "x.yaml").unwrap();
        assert_eq!(parsed, ParsedParameter::default());
    }

    #[test]
    fn test_non_numeric_and_non_date_entries_are_ignored() {
        let content = r#"
values:
  2025-01-01: "pending"
  2026-01-01: true
  2027-01-01: {note: no value here}
  baseline: 12
  2028: 7
"#;
        let parsed = parse_parameter(content, ParseMode::Flat, "old", "x.yaml").unwrap();
        assert_eq!(parsed.values.years(), years(&[2028]));
    }

    #[test]
    fn test_malformed_yaml_is_fatal() {
        let err = parse_parameter("values: [1, 2\n", ParseMode::Flat, "old", "x.yaml").unwrap_err();
        assert!(matches!(err, TrackerError::MalformedInput { .. }));

        let err = parse_parameter("- 1\n- 2\n", ParseMode::Flat, "old", "x.yaml").unwrap_err();
        assert!(err.to_string().contains("not a mapping"));

        let err = parse_parameter("values: [1, 2]\n", ParseMode::Flat, "old", "x.yaml").unwrap_err();
        assert!(err.to_string().contains("`values`"));
    }

    #[test]
    fn test_underscored_numbers() {
        assert_eq!(underscored_number("9_033_840_000_000"), Some(9_033_840_000_000.0));
        assert_eq!(underscored_number("1_000.5"), Some(1000.5));
        assert_eq!(underscored_number("1000"), None);
        assert_eq!(underscored_number("not_a_number"), None);
    }

    #[test]
    fn test_classify_nested_shapes() {
        let doc = parse_document(INCOME, "old", "income_by_source.yaml").unwrap();

        let structured = SubParameterShape::classify(doc.get("employment_income"));
        assert!(matches!(structured, SubParameterShape::Structured(_)));
        let (values, label) = structured.extract("employment_income", "old", "income.yaml").unwrap();
        assert_eq!(label, "Wages and salaries");
        assert_eq!(values.get(y(2026)), Some(11_900_000_000_000.0));

        let flat = SubParameterShape::classify(doc.get("taxable_interest_income"));
        assert!(matches!(flat, SubParameterShape::Flat(_)));
        let (values, label) = flat.extract("taxable_interest_income", "old", "income.yaml").unwrap();
        assert_eq!(label, "Taxable interest");
        assert_eq!(values.years(), years(&[2025, 2026]));
        assert_eq!(values.get(y(2026)), Some(190_000_000_000.0));

        let (values, label) = SubParameterShape::classify(doc.get("qualified_dividend_income"))
            .extract("qualified_dividend_income", "old", "income.yaml")
            .unwrap();
        assert_eq!(label, "");
        assert_eq!(values.get(y(2026)), Some(0.0));

        assert!(SubParameterShape::classify(doc.get("missing")).is_absent());
        assert!(SubParameterShape::classify(Some(&Value::Bool(true))).is_absent());
    }

    #[test]
    fn test_structured_values_must_be_a_mapping() {
        let doc = parse_document(
            "wages:\n  values: [1, 2]\nrents:\n  values: null\n",
            "new",
            "income.yaml",
        )
        .unwrap();

        let wages = SubParameterShape::classify(doc.get("wages"));
        let err = wages.extract("wages", "new", "income.yaml").unwrap_err();
        assert!(matches!(err, TrackerError::MalformedInput { .. }));
        assert!(err.to_string().contains("`wages.values`"));

        let rents = SubParameterShape::classify(doc.get("rents"));
        let (values, _) = rents.extract("rents", "new", "income.yaml").unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_sub_parameter_keys_skip_reserved() {
        let doc = parse_document(INCOME, "old", "income_by_source.yaml").unwrap();
        assert_eq!(
            sub_parameter_keys(&doc),
            vec![
                "employment_income",
                "qualified_dividend_income",
                "taxable_interest_income"
            ]
        );
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("qualified_dividend_income"), "Qualified Dividend Income");
        assert_eq!(title_case("ssi"), "Ssi");
        assert_eq!(title_case("k401_plan"), "K401 Plan");
    }
}
