//! Data models for the baseline tracker.
//!
//! This module contains the year-keyed time series and the two persisted
//! documents: the parameter comparison and the aggregate rollup.

use crate::error::TrackerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// A four-digit calendar year, serialized as a string key (`"2025"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Year(u16);

impl Year {
    /// Create a year, rejecting anything outside 1000..=9999.
    pub fn new(year: u16) -> Option<Self> {
        (1000..=9999).contains(&year).then_some(Year(year))
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Extract the year component of a date key such as `2025-01-01`.
    pub fn from_date_key(key: &str) -> Option<Self> {
        key.split('-').next()?.parse().ok()
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for Year {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid year key: {:?}", s));
        }
        s.parse::<u16>()
            .ok()
            .and_then(Year::new)
            .ok_or_else(|| format!("invalid year key: {:?}", s))
    }
}

impl Serialize for Year {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Year {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-year numeric values. Keys are unique and need not be contiguous.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSeries(BTreeMap<Year, f64>);

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, year: Year) -> Option<f64> {
        self.0.get(&year).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Year, f64)> + '_ {
        self.0.iter().map(|(year, value)| (*year, *value))
    }

    pub fn years(&self) -> BTreeSet<Year> {
        self.0.keys().copied().collect()
    }

    /// Percent change `(new - old) / |old| * 100`, rounded to two decimals.
    ///
    /// Defined on the years both series share; years where `old` is exactly
    /// zero are left out.
    pub fn pct_change(old: &TimeSeries, new: &TimeSeries) -> TimeSeries {
        old.0
            .iter()
            .filter_map(|(year, &o)| {
                let n = new.get(*year)?;
                if o == 0.0 {
                    return None;
                }
                Some((*year, round2((n - o) / o.abs() * 100.0)))
            })
            .collect()
    }

    /// Absolute difference `new - old` on the years both series share.
    pub fn diff(old: &TimeSeries, new: &TimeSeries) -> TimeSeries {
        old.0
            .iter()
            .filter_map(|(year, &o)| new.get(*year).map(|n| (*year, n - o)))
            .collect()
    }

    /// Keep only the given years.
    pub fn restrict_to(&self, years: &BTreeSet<Year>) -> TimeSeries {
        self.iter().filter(|(year, _)| years.contains(year)).collect()
    }
}

/// Later pairs overwrite earlier ones for the same year.
impl FromIterator<(Year, f64)> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = (Year, f64)>>(iter: I) -> Self {
        TimeSeries(iter.into_iter().collect())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Category tag of a tracked parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Revenue,
    Spending,
    Income,
    Cpi,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Revenue => write!(f, "revenue"),
            Category::Spending => write!(f, "spending"),
            Category::Income => write!(f, "income"),
            Category::Cpi => write!(f, "cpi"),
        }
    }
}

/// One of the two points in time being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    Old,
    New,
}

impl Snapshot {
    /// The series of `entry` recorded for this snapshot.
    pub fn series(self, entry: &ParameterEntry) -> &TimeSeries {
        match self {
            Snapshot::Old => &entry.old,
            Snapshot::New => &entry.new,
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snapshot::Old => write!(f, "old"),
            Snapshot::New => write!(f, "new"),
        }
    }
}

/// A named parameter compared across both snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    /// Display label.
    pub label: String,
    /// Unit of the values (e.g. `currency-USD`).
    pub unit: String,
    /// Category tag.
    pub category: Category,
    /// Values under the old snapshot.
    pub old: TimeSeries,
    /// Values under the new snapshot.
    pub new: TimeSeries,
    /// Percent change on the shared years.
    pub pct_change: TimeSeries,
}

impl ParameterEntry {
    /// Build an entry, deriving `pct_change` from the two series.
    pub fn new(
        label: String,
        unit: String,
        category: Category,
        old: TimeSeries,
        new: TimeSeries,
    ) -> Self {
        let pct_change = TimeSeries::pct_change(&old, &new);
        Self {
            label,
            unit,
            category,
            old,
            new,
            pct_change,
        }
    }
}

/// Metadata describing where a comparison came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetadata {
    /// Label of the old baseline (e.g. "February 2024").
    pub old_baseline: String,
    /// Label of the new baseline.
    pub new_baseline: String,
    /// Publication the new baseline comes from.
    pub source_url: String,
    /// RFC 3339 timestamp of the extraction run.
    pub generated_at: String,
}

/// Output of the extraction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonDocument {
    pub metadata: ComparisonMetadata,
    pub parameters: BTreeMap<String, ParameterEntry>,
}

impl ComparisonDocument {
    pub fn from_json(content: &str) -> Result<Self, TrackerError> {
        Ok(serde_json::from_str(content)?)
    }
}

/// A rollup of several parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetric {
    pub label: String,
    pub description: String,
    pub old: TimeSeries,
    pub new: TimeSeries,
    pub pct_change: TimeSeries,
    pub diff: TimeSeries,
}

impl AggregateMetric {
    /// Build a metric from its full series, publishing only `years`.
    ///
    /// Percent change and diff are computed before the year restriction.
    pub fn new(
        label: &str,
        description: &str,
        old: &TimeSeries,
        new: &TimeSeries,
        years: &BTreeSet<Year>,
    ) -> Self {
        Self {
            label: label.to_string(),
            description: description.to_string(),
            old: old.restrict_to(years),
            new: new.restrict_to(years),
            pct_change: TimeSeries::pct_change(old, new).restrict_to(years),
            diff: TimeSeries::diff(old, new).restrict_to(years),
        }
    }
}

/// Comparison metadata plus the component lists behind the rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetadata {
    #[serde(flatten)]
    pub source: ComparisonMetadata,
    pub revenue_components: Vec<String>,
    pub spending_components: Vec<String>,
}

/// Output of the aggregation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDocument {
    pub metadata: AggregateMetadata,
    /// Published years, ascending.
    pub years: Vec<Year>,
    pub metrics: BTreeMap<String, AggregateMetric>,
}
