//! Collector recording whether an HTTP response body matched a named pattern

use serde_json::{Value, json};

use crate::aggregate::{AggregateField, AggregateKind, AggregateState, FieldMap};
use crate::registry::Collector;

pub const BODY_PATTERN_COLLECTOR_ID: &str = "http.body_pattern";

const FIELDS: &[AggregateField] = &[AggregateField::new("matches", AggregateKind::Rate)];

pub struct BodyPatternCollector;

impl BodyPatternCollector {
    /// Per-run payload stored under `collectors.<pattern name>`
    pub fn payload(matched: bool) -> Value {
        json!({
            "collector_id": BODY_PATTERN_COLLECTOR_ID,
            "matched": matched,
        })
    }
}

impl Collector for BodyPatternCollector {
    fn id(&self) -> &'static str {
        BODY_PATTERN_COLLECTOR_ID
    }

    fn declared_fields(&self) -> &'static [AggregateField] {
        FIELDS
    }

    fn aggregate_instance(&self, results: &[&Value]) -> FieldMap {
        let matched = results
            .iter()
            .filter(|r| r.get("matched").and_then(Value::as_bool) == Some(true))
            .count() as u64;

        FieldMap::from([(
            "matches".to_string(),
            AggregateState::rate(matched, results.len() as u64),
        )])
    }
}
