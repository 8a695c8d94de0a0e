//! Registry-dispatched merge of aggregated results
//!
//! ## Two levels
//!
//! ```text
//! AggregatedResult
//! ├── strategy fields      → merged by strategy.merge_result   (registry.strategy(id))
//! └── collectors
//!     └── <instance id>    → merged by collector.merge_result  (registry.collector(collector_id))
//! ```
//!
//! Lookup failures never abort a merge: the first state seen is kept unmerged
//! and a warning is logged.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use super::state::{AggregatedResult, CollectorAggregate, FieldMap};
use crate::registry::Registry;
use crate::storage::schema::RunRow;

/// Merge the aggregated results of several buckets into one.
///
/// - no present result → `None`
/// - exactly one → returned unchanged
/// - otherwise strategy fields and each collector instance are folded
///   pairwise with the merge function resolved from `registry`
pub fn merge_aggregated_bucket_results<'a>(
    registry: &Registry,
    strategy_id: &str,
    results: impl IntoIterator<Item = Option<&'a AggregatedResult>>,
) -> Option<AggregatedResult> {
    let valid: Vec<&AggregatedResult> = results.into_iter().flatten().collect();

    match valid.as_slice() {
        [] => return None,
        [only] => return Some((*only).clone()),
        _ => {}
    }

    let fields = merge_strategy_fields(registry, strategy_id, &valid);
    let collectors = merge_collectors(registry, &valid);

    Some(AggregatedResult { fields, collectors })
}

fn merge_strategy_fields(
    registry: &Registry,
    strategy_id: &str,
    results: &[&AggregatedResult],
) -> FieldMap {
    let Some(strategy) = registry.strategy(strategy_id) else {
        warn!(
            strategy_id,
            inputs = results.len(),
            "no strategy registered, keeping first aggregated result unmerged"
        );
        return results[0].fields.clone();
    };

    let mut iter = results.iter().map(|r| &r.fields);
    let first = iter.next().cloned().unwrap_or_default();
    iter.fold(first, |acc, next| strategy.merge_result(&acc, next))
}

fn merge_collectors(
    registry: &Registry,
    results: &[&AggregatedResult],
) -> BTreeMap<String, CollectorAggregate> {
    let instance_ids: BTreeSet<&String> = results.iter().flat_map(|r| r.collectors.keys()).collect();

    let mut merged = BTreeMap::new();

    for instance_id in instance_ids {
        let states: Vec<&CollectorAggregate> = results
            .iter()
            .filter_map(|r| r.collectors.get(instance_id))
            .collect();

        let Some(first) = states.first() else {
            continue;
        };

        let collector_id = &first.collector_id;
        let fields = match registry.collector(collector_id) {
            Some(collector) => states[1..].iter().fold(first.fields.clone(), |acc, next| {
                collector.merge_result(&acc, &next.fields)
            }),
            None => {
                warn!(
                    collector_id = %collector_id,
                    instance_id = %instance_id,
                    "no collector registered, keeping first state unmerged"
                );
                first.fields.clone()
            }
        };

        merged.insert(
            instance_id.clone(),
            CollectorAggregate {
                collector_id: collector_id.clone(),
                fields,
            },
        );
    }

    merged
}

/// Build the aggregated result of a set of raw runs.
///
/// Strategy fields come from the strategy's `aggregate_runs`; collector state
/// is built per instance from the `collectors` object of each run result.
/// Returns `None` when nothing could be aggregated.
pub fn aggregate_runs(
    registry: &Registry,
    strategy_id: &str,
    runs: &[RunRow],
) -> Option<AggregatedResult> {
    if runs.is_empty() {
        return None;
    }

    let fields = match registry.strategy(strategy_id) {
        Some(strategy) => strategy.aggregate_runs(runs),
        None => {
            warn!(strategy_id, "no strategy registered, skipping strategy aggregation");
            FieldMap::new()
        }
    };

    // instance id -> (collector id, per-run payloads)
    let mut instances: BTreeMap<&str, (&str, Vec<&serde_json::Value>)> = BTreeMap::new();
    for run in runs {
        let Some(collectors) = run.result.get("collectors").and_then(|c| c.as_object()) else {
            continue;
        };
        for (instance_id, payload) in collectors {
            let Some(collector_id) = payload.get("collector_id").and_then(|c| c.as_str()) else {
                continue;
            };
            instances
                .entry(instance_id.as_str())
                .or_insert_with(|| (collector_id, Vec::new()))
                .1
                .push(payload);
        }
    }

    let mut collectors = BTreeMap::new();
    for (instance_id, (collector_id, payloads)) in instances {
        let Some(collector) = registry.collector(collector_id) else {
            warn!(collector_id, instance_id, "no collector registered, skipping instance");
            continue;
        };
        collectors.insert(
            instance_id.to_string(),
            CollectorAggregate {
                collector_id: collector_id.to_string(),
                fields: collector.aggregate_instance(&payloads),
            },
        );
    }

    let result = AggregatedResult { fields, collectors };
    (!result.is_empty()).then_some(result)
}
