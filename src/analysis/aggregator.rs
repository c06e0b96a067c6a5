//! Aggregate fiscal metrics.
//!
//! This module sums parameter series from the comparison document into
//! total revenue and total spending, derives the fiscal balance, and
//! publishes everything over the projection window.

use crate::config::{AggregateDefinition, AggregateRegistry};
use crate::models::{
    AggregateDocument, AggregateMetadata, AggregateMetric, ComparisonDocument, Snapshot,
    TimeSeries, Year,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Computes the aggregate document from a comparison document.
pub struct Aggregator {
    registry: AggregateRegistry,
}

impl Aggregator {
    pub fn new(registry: AggregateRegistry) -> Self {
        Self { registry }
    }

    /// Build the aggregate document.
    pub fn run(&self, comparison: &ComparisonDocument) -> AggregateDocument {
        let revenue = &self.registry.revenue;
        let spending = &self.registry.spending;

        let rev_old = sum_components(comparison, &revenue.components, Snapshot::Old);
        let rev_new = sum_components(comparison, &revenue.components, Snapshot::New);
        let spend_old = sum_components(comparison, &spending.components, Snapshot::Old);
        let spend_new = sum_components(comparison, &spending.components, Snapshot::New);

        let (balance_old, balance_new) = fiscal_balance(&rev_old, &spend_old, &rev_new, &spend_new);

        let years = published_years(
            [&rev_old, &rev_new, &spend_old, &spend_new],
            self.registry.year_cutoff,
        );
        debug!("Published years: {:?}", years);

        let balance = &self.registry.balance;
        let mut metrics = BTreeMap::new();
        metrics.insert(
            revenue.key.clone(),
            build_metric(revenue, &rev_old, &rev_new, &years),
        );
        metrics.insert(
            spending.key.clone(),
            build_metric(spending, &spend_old, &spend_new, &years),
        );
        metrics.insert(
            balance.key.clone(),
            AggregateMetric::new(
                &balance.label,
                &balance.description,
                &balance_old,
                &balance_new,
                &years,
            ),
        );

        for (key, metric) in &metrics {
            info!(
                "  {:20}  old={}  new={}  label={:?}",
                key,
                metric.old.len(),
                metric.new.len(),
                metric.label
            );
        }

        AggregateDocument {
            metadata: AggregateMetadata {
                source: comparison.metadata.clone(),
                revenue_components: revenue.components.clone(),
                spending_components: spending.components.clone(),
            },
            years: years.into_iter().collect(),
            metrics,
        }
    }
}

fn build_metric(
    definition: &AggregateDefinition,
    old: &TimeSeries,
    new: &TimeSeries,
    years: &BTreeSet<Year>,
) -> AggregateMetric {
    AggregateMetric::new(&definition.label, &definition.description, old, new, years)
}

/// Sum the given parameters for one snapshot.
///
/// A year appears if any present component has data for it; components
/// without data for that year are left out of its sum. Components missing
/// from the document are ignored.
pub fn sum_components(
    comparison: &ComparisonDocument,
    components: &[String],
    snapshot: Snapshot,
) -> TimeSeries {
    let series: Vec<&TimeSeries> = components
        .iter()
        .filter_map(|key| {
            let entry = comparison.parameters.get(key);
            if entry.is_none() {
                debug!("Component {} not in comparison document ({} series)", key, snapshot);
            }
            entry
        })
        .map(|entry| snapshot.series(entry))
        .collect();

    let mut totals: BTreeMap<Year, f64> = BTreeMap::new();
    for s in series {
        for (year, value) in s.iter() {
            *totals.entry(year).or_insert(0.0) += value;
        }
    }

    totals.into_iter().collect()
}

/// Revenue minus spending, over the years all four series share.
pub fn fiscal_balance(
    rev_old: &TimeSeries,
    spend_old: &TimeSeries,
    rev_new: &TimeSeries,
    spend_new: &TimeSeries,
) -> (TimeSeries, TimeSeries) {
    let mut shared = rev_old.years();
    for other in [spend_old, rev_new, spend_new] {
        let years = other.years();
        shared.retain(|year| years.contains(year));
    }

    let balance = |rev: &TimeSeries, spend: &TimeSeries| -> TimeSeries {
        shared
            .iter()
            .filter_map(|year| Some((*year, rev.get(*year)? - spend.get(*year)?)))
            .collect()
    };

    (balance(rev_old, spend_old), balance(rev_new, spend_new))
}

/// Union of the years of `series`, restricted to `year >= cutoff`.
pub fn published_years<'a>(
    series: impl IntoIterator<Item = &'a TimeSeries>,
    cutoff: u16,
) -> BTreeSet<Year> {
    series
        .into_iter()
        .flat_map(|s| s.years())
        .filter(|year| year.value() >= cutoff)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ComparisonMetadata, ParameterEntry};

    fn y(year: u16) -> Year {
        Year::new(year).unwrap()
    }

    fn series(pairs: &[(u16, f64)]) -> TimeSeries {
        pairs.iter().map(|(year, value)| (y(*year), *value)).collect()
    }

    fn entry(category: Category, old: &[(u16, f64)], new: &[(u16, f64)]) -> ParameterEntry {
        ParameterEntry::new(
            String::new(),
            "currency-USD".to_string(),
            category,
            series(old),
            series(new),
        )
    }

    fn document(parameters: Vec<(&str, ParameterEntry)>) -> ComparisonDocument {
        ComparisonDocument {
            metadata: ComparisonMetadata {
                old_baseline: "February 2024".to_string(),
                new_baseline: "February 2026".to_string(),
                source_url: "https://www.cbo.gov/publication/61882".to_string(),
                generated_at: "2026-02-11T15:00:00+00:00".to_string(),
            },
            parameters: parameters
                .into_iter()
                .map(|(key, entry)| (key.to_string(), entry))
                .collect(),
        }
    }

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_union_with_partial_sum() {
        let doc = document(vec![
            ("a", entry(Category::Revenue, &[(2025, 10.0), (2026, 20.0)], &[])),
            ("b", entry(Category::Revenue, &[(2026, 5.0), (2027, 7.0)], &[])),
        ]);

        let total = sum_components(&doc, &keys(&["a", "b"]), Snapshot::Old);
        assert_eq!(total, series(&[(2025, 10.0), (2026, 25.0), (2027, 7.0)]));
        assert!(sum_components(&doc, &keys(&["a", "b"]), Snapshot::New).is_empty());
    }

    #[test]
    fn test_missing_component_is_skipped() {
        let doc = document(vec![(
            "a",
            entry(Category::Spending, &[(2025, 1.0)], &[(2025, 2.0)]),
        )]);

        let total = sum_components(&doc, &keys(&["a", "not_extracted"]), Snapshot::New);
        assert_eq!(total, series(&[(2025, 2.0)]));
        assert!(sum_components(&doc, &keys(&["not_extracted"]), Snapshot::New).is_empty());
    }

    #[test]
    fn test_fiscal_balance_uses_four_way_intersection() {
        let rev = series(&[(2025, 100.0), (2026, 110.0), (2027, 120.0)]);
        let spend = series(&[(2026, 90.0), (2027, 130.0)]);

        let (old, new) = fiscal_balance(&rev, &spend, &rev, &spend);
        assert_eq!(old, series(&[(2026, 20.0), (2027, -10.0)]));
        assert_eq!(new, old);

        // A year missing from any one of the four series drops out.
        let rev_new = series(&[(2026, 115.0)]);
        let (old, new) = fiscal_balance(&rev, &spend, &rev_new, &spend);
        assert_eq!(old, series(&[(2026, 20.0)]));
        assert_eq!(new, series(&[(2026, 25.0)]));
    }

    #[test]
    fn test_published_years_respect_cutoff() {
        let a = series(&[(2023, 1.0), (2024, 1.0), (2025, 1.0)]);
        let b = series(&[(2026, 1.0), (2027, 1.0)]);
        let years: Vec<Year> = published_years([&a, &b], 2025).into_iter().collect();
        assert_eq!(years, vec![y(2025), y(2026), y(2027)]);
    }

    #[test]
    fn test_full_aggregation() {
        let doc = document(vec![
            (
                "income_tax",
                entry(
                    Category::Revenue,
                    &[(2023, 50.0), (2024, 60.0), (2025, 70.0), (2026, 80.0), (2027, 90.0)],
                    &[(2023, 50.0), (2024, 65.0), (2025, 77.0), (2026, 88.0), (2027, 99.0)],
                ),
            ),
            (
                "payroll_taxes",
                entry(
                    Category::Revenue,
                    &[(2025, 30.0), (2026, 40.0)],
                    &[(2025, 33.0), (2026, 44.0)],
                ),
            ),
            (
                "snap",
                entry(
                    Category::Spending,
                    &[(2024, 10.0), (2025, 100.0), (2026, 120.0)],
                    &[(2024, 10.0), (2025, 100.0), (2026, 100.0)],
                ),
            ),
            ("cpi_u", entry(Category::Cpi, &[(2025, 300.0)], &[(2025, 310.0)])),
        ]);

        let aggregate = Aggregator::new(AggregateRegistry::default()).run(&doc);

        assert_eq!(aggregate.years, vec![y(2025), y(2026), y(2027)]);
        assert_eq!(aggregate.metadata.source, doc.metadata);
        assert_eq!(aggregate.metadata.spending_components.len(), 4);

        let revenue = &aggregate.metrics["total_revenue"];
        assert_eq!(revenue.label, "Total federal revenue");
        assert_eq!(revenue.old, series(&[(2025, 100.0), (2026, 120.0), (2027, 90.0)]));
        assert_eq!(revenue.new, series(&[(2025, 110.0), (2026, 132.0), (2027, 99.0)]));
        assert_eq!(revenue.diff, series(&[(2025, 10.0), (2026, 12.0), (2027, 9.0)]));
        assert_eq!(revenue.pct_change, series(&[(2025, 10.0), (2026, 10.0), (2027, 10.0)]));

        let spending = &aggregate.metrics["total_spending"];
        assert_eq!(spending.old, series(&[(2025, 100.0), (2026, 120.0)]));
        assert_eq!(spending.pct_change.get(y(2026)), Some(-16.67));

        let balance = &aggregate.metrics["fiscal_balance"];
        assert_eq!(balance.old, series(&[(2025, 0.0), (2026, 0.0)]));
        assert_eq!(balance.new, series(&[(2025, 10.0), (2026, 32.0)]));
        assert_eq!(balance.diff, series(&[(2025, 10.0), (2026, 32.0)]));
        // Zero old balances have no percent change.
        assert!(balance.pct_change.is_empty());
    }

    #[test]
    fn test_aggregate_document_json_shape() {
        let doc = document(vec![(
            "income_tax",
            entry(Category::Revenue, &[(2025, 1.0)], &[(2025, 2.0)]),
        )]);
        let aggregate = Aggregator::new(AggregateRegistry::default()).run(&doc);
        let json = serde_json::to_value(&aggregate).unwrap();

        assert_eq!(json["years"], serde_json::json!(["2025"]));
        assert_eq!(json["metadata"]["new_baseline"], "February 2026");
        assert_eq!(json["metadata"]["revenue_components"][1], "payroll_taxes");
        assert_eq!(json["metrics"]["total_revenue"]["diff"]["2025"], 1.0);
        assert_eq!(json["metrics"]["total_spending"]["old"], serde_json::json!({}));
        assert_eq!(json["metrics"]["fiscal_balance"]["new"], serde_json::json!({}));
    }
}
