// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! State abstraction — mapping raw sources to symbolic values, with
//! interpolation-based merging.
//!
//! A state definition names the sources it abstracts from, the contexts that
//! must hold, an ordered mapping table from source conditions to a symbolic
//! output value, and an interpolation function giving the maximum temporal
//! gap over which two equal-valued results may be merged into one instance.
//! Every abort path is a silent "no abstraction this cycle".

use crate::instance::{Element, ElementKind};
use crate::interval::TimeInterval;
use crate::ontology::condition::{NumericRange, SymbolicCondition};
use crate::ontology::DefCommon;
use crate::store::InstanceStore;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kinds a state may abstract from. Trend sources are declared but
/// unimplemented: resolving one always aborts the abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Primitive,
    State,
    Trend,
}

/// A named abstracted-from source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub name: String,
}

impl SourceRef {
    pub fn primitive(name: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Primitive,
            name: name.into(),
        }
    }

    pub fn state(name: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::State,
            name: name.into(),
        }
    }
}

/// One per-source condition inside a mapping row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceCondition {
    /// Numeric range test against a primitive source's value.
    Primitive { name: String, range: NumericRange },
    /// Exact symbolic-equality test against a state source's value.
    State { name: String, value: SymbolicCondition },
}

impl SourceCondition {
    fn source_name(&self) -> &str {
        match self {
            SourceCondition::Primitive { name, .. } | SourceCondition::State { name, .. } => name,
        }
    }

    fn holds(&self, element: &Element) -> bool {
        match self {
            SourceCondition::Primitive { range, .. } => {
                element.numeric_value().map_or(false, |v| range.contains(v))
            }
            SourceCondition::State { value, .. } => value.holds(element),
        }
    }
}

/// One row of the mapping table: an output value guarded by per-source
/// conditions. The row matches only when every listed condition holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRow {
    pub output: String,
    pub conditions: Vec<SourceCondition>,
}

impl MappingRow {
    fn matches(&self, resolved: &[(&SourceRef, &Element)]) -> bool {
        self.conditions.iter().all(|cond| {
            resolved
                .iter()
                .find(|(src, _)| src.name == cond.source_name())
                .map_or(false, |(_, element)| cond.holds(element))
        })
    }
}

/// Symbolic value → maximum allowable merge gap, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterpolationFunction {
    pub max_gap_ms: FnvHashMap<String, i64>,
}

impl InterpolationFunction {
    pub fn new(max_gap_ms: FnvHashMap<String, i64>) -> Self {
        Self { max_gap_ms }
    }

    /// Whether an open instance with `value` ending at `current_end` may be
    /// merged with a new result starting at `new_start`.
    fn allows_merge(&self, value: &str, current: &TimeInterval, new: &TimeInterval) -> bool {
        let Some(&max_gap) = self.max_gap_ms.get(value) else {
            return false;
        };
        let gap = (new.start - current.end).num_milliseconds();
        gap <= max_gap
    }
}

/// A state abstraction definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDef {
    #[serde(flatten)]
    pub common: DefCommon,
    pub abstracted_from: Vec<SourceRef>,
    #[serde(default)]
    pub necessary_contexts: Vec<String>,
    pub mapping: Vec<MappingRow>,
    #[serde(default)]
    pub interpolation: InterpolationFunction,
}

impl StateDef {
    pub fn new(
        name: impl Into<String>,
        abstracted_from: Vec<SourceRef>,
        necessary_contexts: Vec<String>,
        mapping: Vec<MappingRow>,
        interpolation: InterpolationFunction,
    ) -> Self {
        Self {
            common: DefCommon::new(name),
            abstracted_from,
            necessary_contexts,
            mapping,
            interpolation,
        }
    }

    /// Run the abstraction for one cycle. Returns whether an instance was
    /// created or merged.
    pub fn create_state(&mut self, store: &mut InstanceStore, cycle: u64) -> bool {
        if self.common.created_in(cycle) {
            return false;
        }

        // Resolution and mapping borrow the store immutably; the outcome is
        // reduced to an owned (value, interval) pair before any mutation.
        let Some((value, interval)) = self.evaluate(store) else {
            return false;
        };

        let merged = match store.current(ElementKind::State, self.common.name()) {
            Some(current)
                if current.symbolic_value() == Some(value.as_str())
                    && self
                        .interpolation
                        .allows_merge(&value, &current.interval, &interval) =>
            {
                true
            }
            _ => false,
        };

        if merged {
            // The merged instance is the existing current one: widen it in
            // place and finalize; the current slot stays cleared.
            let Some(mut current) = store.take_current(ElementKind::State, self.common.name())
            else {
                return false;
            };
            current.interval.widen_to(&interval);
            debug!(state = %self.common.name(), %value, ?current.interval, "state interpolated");
            store.finalize(current);
        } else {
            debug!(state = %self.common.name(), %value, ?interval, "state created");
            store.set_newest(Element::state(self.common.name(), value, interval));
        }
        self.common.mark_created(cycle);
        true
    }

    /// The pure part of the abstraction: resolve sources and contexts,
    /// compute the enclosing interval, and evaluate the mapping table.
    fn evaluate(&self, store: &InstanceStore) -> Option<(String, TimeInterval)> {
        let sources = self.resolve_sources(store)?;
        let contexts = self.resolve_contexts(store)?;

        let bound = TimeInterval::enclosing(sources.iter().map(|(_, e)| &e.interval), None)?;
        let interval = TimeInterval::enclosing(contexts.iter().map(|e| &e.interval), Some(bound))?;

        let value = self
            .mapping
            .iter()
            .find(|row| row.matches(&sources))
            .map(|row| row.output.clone())?;

        Some((value, interval))
    }

    /// Every abstracted-from source resolved to its current instance; any
    /// missing source (and any trend source) aborts.
    fn resolve_sources<'a>(
        &'a self,
        store: &'a InstanceStore,
    ) -> Option<Vec<(&'a SourceRef, &'a Element)>> {
        self.abstracted_from
            .iter()
            .map(|src| {
                let kind = match src.kind {
                    SourceKind::Primitive => ElementKind::Primitive,
                    SourceKind::State => ElementKind::State,
                    SourceKind::Trend => return None,
                };
                store.current(kind, &src.name).map(|e| (src, e))
            })
            .collect()
    }

    /// Every necessary context, preferring the newest finalized instance and
    /// falling back to a still-open current one.
    fn resolve_contexts<'a>(&self, store: &'a InstanceStore) -> Option<Vec<&'a Element>> {
        self.necessary_contexts
            .iter()
            .map(|name| {
                store
                    .newest(ElementKind::Context, name)
                    .or_else(|| store.current(ElementKind::Context, name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn iv(start: i64, end: i64) -> TimeInterval {
        TimeInterval::new(
            Utc.timestamp_millis_opt(start).unwrap(),
            Utc.timestamp_millis_opt(end).unwrap(),
        )
    }

    fn interpolation(value: &str, max_gap_ms: i64) -> InterpolationFunction {
        let mut gaps = FnvHashMap::default();
        gaps.insert(value.to_string(), max_gap_ms);
        InterpolationFunction::new(gaps)
    }

    /// cpu >= 0.8 in the "busy" context maps to "High", otherwise "Low".
    fn load_state(max_gap_ms: i64) -> StateDef {
        StateDef::new(
            "cpu_load",
            vec![SourceRef::primitive("cpu")],
            vec!["busy".to_string()],
            vec![
                MappingRow {
                    output: "High".to_string(),
                    conditions: vec![SourceCondition::Primitive {
                        name: "cpu".to_string(),
                        range: NumericRange::at_least(0.8),
                    }],
                },
                MappingRow {
                    output: "Low".to_string(),
                    conditions: vec![SourceCondition::Primitive {
                        name: "cpu".to_string(),
                        range: NumericRange::any(),
                    }],
                },
            ],
            interpolation("High", max_gap_ms),
        )
    }

    fn seeded_store(cpu: f64, at: (i64, i64)) -> InstanceStore {
        let mut store = InstanceStore::new(1_000_000);
        store.set_newest(Element::primitive("cpu", cpu, iv(at.0, at.1)));
        store.set_newest(Element::context("busy", iv(at.0, at.1)));
        store
    }

    /// Replace the open context instead of stacking a second one: context
    /// resolution prefers the newest finalized instance over the current.
    fn roll_context(store: &mut InstanceStore, name: &str, interval: TimeInterval) {
        store.take_current(ElementKind::Context, name);
        store.finalize(Element::context(name, interval));
    }

    #[test]
    fn test_state_created_with_mapped_value_and_enclosing_interval() {
        let mut def = load_state(100);
        let mut store = InstanceStore::new(1_000_000);
        store.set_newest(Element::primitive("cpu", 0.95, iv(1000, 2000)));
        // A context wider than the source widens the state's interval.
        store.set_newest(Element::context("busy", iv(500, 2500)));

        assert!(def.create_state(&mut store, 1));
        let state = store.current(ElementKind::State, "cpu_load").unwrap();
        assert_eq!(state.symbolic_value(), Some("High"));
        assert_eq!(state.interval, iv(500, 2500));
    }

    #[test]
    fn test_first_matching_row_wins() {
        // 0.9 satisfies both rows; the "High" row is declared first.
        let mut def = load_state(100);
        let mut store = seeded_store(0.9, (0, 10));
        assert!(def.create_state(&mut store, 1));
        assert_eq!(
            store
                .current(ElementKind::State, "cpu_load")
                .unwrap()
                .symbolic_value(),
            Some("High")
        );
    }

    #[test]
    fn test_missing_source_or_context_aborts() {
        let mut def = load_state(100);
        let mut store = InstanceStore::default();
        assert!(!def.create_state(&mut store, 1));

        // Source present, context missing.
        store.set_newest(Element::primitive("cpu", 0.9, iv(0, 10)));
        assert!(!def.create_state(&mut store, 1));
    }

    #[test]
    fn test_trend_source_always_aborts() {
        let mut def = StateDef::new(
            "s",
            vec![SourceRef {
                kind: SourceKind::Trend,
                name: "cpu_trend".to_string(),
            }],
            vec![],
            vec![MappingRow {
                output: "X".to_string(),
                conditions: vec![],
            }],
            InterpolationFunction::default(),
        );
        let mut store = InstanceStore::default();
        assert!(!def.create_state(&mut store, 1));
    }

    #[test]
    fn test_interpolation_merges_within_max_gap() {
        let mut def = load_state(100);
        let mut store = seeded_store(0.9, (0, 100));
        assert!(def.create_state(&mut store, 1));

        // New result of the same value 50ms after the current instance ends.
        store.set_newest(Element::primitive("cpu", 0.95, iv(150, 200)));
        roll_context(&mut store, "busy", iv(150, 200));
        assert!(def.create_state(&mut store, 2));

        // Merged in place: current slot cleared, single widened instance.
        assert!(store.current(ElementKind::State, "cpu_load").is_none());
        let merged = store.newest(ElementKind::State, "cpu_load").unwrap();
        assert_eq!(merged.interval, iv(0, 200));
        assert!(store.history(ElementKind::State, "cpu_load").is_empty());
    }

    #[test]
    fn test_gap_beyond_max_creates_separate_instance() {
        let mut def = load_state(20);
        let mut store = seeded_store(0.9, (0, 100));
        assert!(def.create_state(&mut store, 1));

        store.set_newest(Element::primitive("cpu", 0.95, iv(150, 200)));
        roll_context(&mut store, "busy", iv(150, 200));
        assert!(def.create_state(&mut store, 2));

        // The old instance is finalized, the new one is current.
        let current = store.current(ElementKind::State, "cpu_load").unwrap();
        assert_eq!(current.interval, iv(150, 200));
        let finalized = store.newest(ElementKind::State, "cpu_load").unwrap();
        assert_eq!(finalized.interval, iv(0, 100));
    }

    #[test]
    fn test_value_change_skips_interpolation() {
        let mut def = load_state(1_000_000);
        let mut store = seeded_store(0.9, (0, 100));
        assert!(def.create_state(&mut store, 1));

        // Low reading → different value → no merge despite a huge max gap.
        store.set_newest(Element::primitive("cpu", 0.1, iv(120, 150)));
        roll_context(&mut store, "busy", iv(120, 150));
        assert!(def.create_state(&mut store, 2));
        assert_eq!(
            store
                .current(ElementKind::State, "cpu_load")
                .unwrap()
                .symbolic_value(),
            Some("Low")
        );
    }

    #[test]
    fn test_create_state_once_per_cycle() {
        let mut def = load_state(100);
        let mut store = seeded_store(0.9, (0, 10));
        assert!(def.create_state(&mut store, 1));
        assert!(!def.create_state(&mut store, 1));
    }
}
