//! Typed aggregate state and the per-kind merge rules
//!
//! Every field of an [`AggregatedResult`] keeps enough internal state to be
//! merged again later: an average keeps its `(sum, count)` pair, a rate keeps
//! `(success_count, total_count)`. Derived values (`avg`, `rate`) are always
//! recomputed from the pair after a merge and never combined directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field name → aggregate state. Ordered so serialization and merges are deterministic.
pub type FieldMap = BTreeMap<String, AggregateState>;

/// Declared merge semantics of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Counter,
    Average,
    MinMax,
    Rate,
}

/// One entry of a strategy's or collector's declared field schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateField {
    pub name: &'static str,
    pub kind: AggregateKind,
}

impl AggregateField {
    pub const fn new(name: &'static str, kind: AggregateKind) -> Self {
        Self { name, kind }
    }
}

/// Internally tracked state of one aggregated field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateState {
    Counter {
        count: u64,
    },
    Average {
        sum: f64,
        count: u64,
        avg: f64,
    },
    MinMax {
        min: f64,
        max: f64,
    },
    Rate {
        success_count: u64,
        total_count: u64,
        /// Percentage in `0..=100`
        rate: f64,
    },
}

impl AggregateState {
    pub fn counter(count: u64) -> Self {
        AggregateState::Counter { count }
    }

    pub fn average(sum: f64, count: u64) -> Self {
        let avg = if count == 0 { 0.0 } else { sum / count as f64 };
        AggregateState::Average { sum, count, avg }
    }

    pub fn min_max(min: f64, max: f64) -> Self {
        AggregateState::MinMax { min, max }
    }

    pub fn rate(success_count: u64, total_count: u64) -> Self {
        let rate = if total_count == 0 {
            0.0
        } else {
            success_count as f64 / total_count as f64 * 100.0
        };
        AggregateState::Rate {
            success_count,
            total_count,
            rate,
        }
    }

    /// Average over the given observations, `None` when there are none.
    pub fn average_of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let (sum, count) = values
            .into_iter()
            .fold((0.0, 0u64), |(sum, count), v| (sum + v, count + 1));
        (count > 0).then(|| Self::average(sum, count))
    }

    /// Min/max over the given observations, `None` when there are none.
    pub fn min_max_of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(Self::min_max(v, v)),
            Some(AggregateState::MinMax { min, max }) => Some(Self::min_max(min.min(v), max.max(v))),
            other => other,
        })
    }

    pub fn kind(&self) -> AggregateKind {
        match self {
            AggregateState::Counter { .. } => AggregateKind::Counter,
            AggregateState::Average { .. } => AggregateKind::Average,
            AggregateState::MinMax { .. } => AggregateKind::MinMax,
            AggregateState::Rate { .. } => AggregateKind::Rate,
        }
    }

    /// Merge two states of the same kind. Returns `None` when the kinds differ.
    pub fn merge(&self, other: &AggregateState) -> Option<AggregateState> {
        use AggregateState::*;

        match (self, other) {
            (Counter { count: a }, Counter { count: b }) => Some(Self::counter(a + b)),
            (
                Average {
                    sum: sum_a,
                    count: count_a,
                    ..
                },
                Average {
                    sum: sum_b,
                    count: count_b,
                    ..
                },
            ) => Some(Self::average(sum_a + sum_b, count_a + count_b)),
            (MinMax { min: min_a, max: max_a }, MinMax { min: min_b, max: max_b }) => {
                Some(Self::min_max(min_a.min(*min_b), max_a.max(*max_b)))
            }
            (
                Rate {
                    success_count: success_a,
                    total_count: total_a,
                    ..
                },
                Rate {
                    success_count: success_b,
                    total_count: total_b,
                    ..
                },
            ) => Some(Self::rate(success_a + success_b, total_a + total_b)),
            _ => None,
        }
    }
}

/// Aggregate state of one collector instance inside a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorAggregate {
    /// Collector type id used to resolve the merge function
    pub collector_id: String,

    #[serde(default)]
    pub fields: FieldMap,
}

/// Domain-specific aggregate payload attached to a bucket
///
/// Strategy-level fields sit at the top level; per-collector state lives
/// under `collectors`, keyed by collector instance id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    #[serde(flatten)]
    pub fields: FieldMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collectors: BTreeMap<String, CollectorAggregate>,
}

impl AggregatedResult {
    pub fn from_fields(fields: FieldMap) -> Self {
        Self {
            fields,
            collectors: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.collectors.is_empty()
    }
}

/// Merge two field maps according to a declared schema.
///
/// Only declared fields survive. A state whose kind disagrees with its
/// declaration is ignored; if only one side carries a valid state, it is
/// taken as-is.
pub fn merge_declared_fields(declared: &[AggregateField], a: &FieldMap, b: &FieldMap) -> FieldMap {
    let mut merged = FieldMap::new();

    for field in declared {
        let pick = |map: &FieldMap| {
            map.get(field.name)
                .filter(|state| state.kind() == field.kind)
                .cloned()
        };

        let state = match (pick(a), pick(b)) {
            (Some(left), Some(right)) => left.merge(&right),
            (Some(only), None) | (None, Some(only)) => Some(only),
            (None, None) => None,
        };

        if let Some(state) = state {
            merged.insert(field.name.to_string(), state);
        }
    }

    merged
}
