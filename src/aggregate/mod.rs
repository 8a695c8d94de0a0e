//! Plugin-extensible aggregate state
//!
//! Buckets carry an optional [`AggregatedResult`]: domain-specific fields a
//! strategy (and its collectors) derive from raw run results. This module
//! holds the typed state ([`state`]) and the registry-dispatched merge used by
//! the bucket combiner and the rollup worker ([`merge`]).
//!
//! Merges are associative and commutative, so a rollup may be re-run over the
//! same inputs, or over any partition of them, with identical output.

pub mod merge;
pub mod state;

pub use merge::{aggregate_runs, merge_aggregated_bucket_results};
pub use state::{
    AggregateField, AggregateKind, AggregateState, AggregatedResult, CollectorAggregate,
    FieldMap, merge_declared_fields,
};
