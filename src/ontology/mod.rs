// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! The ontology — the declarative definitions the engine executes.
//!
//! An [`Ontology`] is the validated, in-memory form of the knowledge base:
//! primitive declarations, context definitions, state abstractions, and
//! pattern definitions, each carrying the shared bookkeeping in
//! [`DefCommon`] (the at-most-once-per-cycle creation guard and the
//! ref-counted monitoring flag). Parsing a source document is a host concern;
//! every definition type derives `Deserialize`, so a JSON ontology can be
//! materialized with [`Ontology::from_json`] and no custom parser.

pub mod condition;
pub mod context;
pub mod monitor;
pub mod pattern;
pub mod state;

use crate::instance::ElementKind;
use anyhow::{ensure, Context as _, Result};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use condition::{DurationCondition, NumericRange, SymbolicCondition};
pub use context::{Anchor, ContextDef, Destruction, Induction};
pub use pattern::{PairwiseConstraint, PatternDef, PatternElement, TemporalRelation, ValueRelation};
pub use state::{InterpolationFunction, MappingRow, SourceCondition, SourceRef, StateDef};

/// Fields shared by every definition variant.
///
/// `last_created` implements the de-duplication guard: a definition's own
/// creation routine sets it at most once per cycle and nothing else touches
/// it. `monitor_refs` counts how many active assessments currently require
/// this definition to be observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefCommon {
    pub name: String,
    #[serde(skip)]
    last_created: Option<u64>,
    #[serde(skip)]
    monitor_refs: u32,
}

impl DefCommon {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_created: None,
            monitor_refs: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when this definition already produced an instance in `cycle`.
    pub fn created_in(&self, cycle: u64) -> bool {
        self.last_created == Some(cycle)
    }

    /// Record a creation. Creating twice in one cycle is a programming error,
    /// not a recoverable condition.
    pub fn mark_created(&mut self, cycle: u64) {
        debug_assert!(
            !self.created_in(cycle),
            "definition '{}' created twice in cycle {cycle}",
            self.name
        );
        self.last_created = Some(cycle);
    }

    pub fn is_monitored(&self) -> bool {
        self.monitor_refs > 0
    }

    pub fn monitor_refs(&self) -> u32 {
        self.monitor_refs
    }

    pub(crate) fn add_monitor_ref(&mut self) {
        self.monitor_refs += 1;
    }

    pub(crate) fn release_monitor_ref(&mut self) {
        self.monitor_refs = self.monitor_refs.saturating_sub(1);
    }
}

/// A declared raw input. Primitives carry no creation logic of their own
/// (readings arrive from ingestion), but they participate in the definition
/// graph as monitoring leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimitiveDef {
    #[serde(flatten)]
    pub common: DefCommon,
}

impl PrimitiveDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            common: DefCommon::new(name),
        }
    }
}

/// The validated definition registry.
///
/// Contexts, states, and patterns keep their declared order: the per-cycle
/// sweep runs them in that order, and abstractions are declared bottom-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ontology {
    #[serde(default = "default_ontology_name")]
    pub name: String,
    #[serde(default = "default_element_timeout_ms")]
    pub element_timeout_ms: i64,
    #[serde(default)]
    primitives: FnvHashMap<String, PrimitiveDef>,
    #[serde(default)]
    contexts: Vec<ContextDef>,
    #[serde(default)]
    states: Vec<StateDef>,
    #[serde(default)]
    patterns: Vec<PatternDef>,
}

fn default_ontology_name() -> String {
    "default".to_string()
}

fn default_element_timeout_ms() -> i64 {
    crate::store::DEFAULT_ELEMENT_TIMEOUT_MS
}

impl Ontology {
    pub fn new(
        name: impl Into<String>,
        element_timeout_ms: i64,
        primitives: Vec<PrimitiveDef>,
        contexts: Vec<ContextDef>,
        states: Vec<StateDef>,
        patterns: Vec<PatternDef>,
    ) -> Self {
        let mut ontology = Self {
            name: name.into(),
            element_timeout_ms,
            primitives: primitives
                .into_iter()
                .map(|p| (p.common.name.clone(), p))
                .collect(),
            contexts,
            states,
            patterns,
        };
        ontology.finalize();
        ontology
    }

    /// Materialize an ontology from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut ontology: Ontology =
            serde_json::from_str(json).context("failed to deserialize ontology")?;
        ensure!(
            ontology.element_timeout_ms >= 1_000,
            "element timeout must be at least one second"
        );
        ontology.finalize();
        Ok(ontology)
    }

    /// Per-definition load-time precomputation. Currently this rearranges
    /// every pattern's constraint order; it must run before the first cycle.
    fn finalize(&mut self) {
        for pattern in &mut self.patterns {
            pattern.rearrange_constraints();
        }
        debug!(
            ontology = %self.name,
            contexts = self.contexts.len(),
            states = self.states.len(),
            patterns = self.patterns.len(),
            "ontology finalized"
        );
    }

    pub fn contexts(&self) -> &[ContextDef] {
        &self.contexts
    }

    pub fn states(&self) -> &[StateDef] {
        &self.states
    }

    pub fn patterns(&self) -> &[PatternDef] {
        &self.patterns
    }

    pub(crate) fn contexts_mut(&mut self) -> &mut [ContextDef] {
        &mut self.contexts
    }

    pub(crate) fn states_mut(&mut self) -> &mut [StateDef] {
        &mut self.states
    }

    pub(crate) fn patterns_mut(&mut self) -> &mut [PatternDef] {
        &mut self.patterns
    }

    /// Whether a definition of the given kind and name exists. Trend
    /// definitions are never present.
    pub fn contains(&self, kind: ElementKind, name: &str) -> bool {
        match kind {
            ElementKind::Primitive => self.primitives.contains_key(name),
            ElementKind::Context => self.contexts.iter().any(|d| d.common.name == name),
            ElementKind::State => self.states.iter().any(|d| d.common.name == name),
            ElementKind::Pattern => self.patterns.iter().any(|d| d.common.name == name),
            ElementKind::Trend => false,
        }
    }

    /// Shared access to a definition's common fields, by kind and name.
    pub fn def_common(&self, kind: ElementKind, name: &str) -> Option<&DefCommon> {
        match kind {
            ElementKind::Primitive => self.primitives.get(name).map(|d| &d.common),
            ElementKind::Context => self
                .contexts
                .iter()
                .find(|d| d.common.name == name)
                .map(|d| &d.common),
            ElementKind::State => self
                .states
                .iter()
                .find(|d| d.common.name == name)
                .map(|d| &d.common),
            ElementKind::Pattern => self
                .patterns
                .iter()
                .find(|d| d.common.name == name)
                .map(|d| &d.common),
            ElementKind::Trend => None,
        }
    }

    pub(crate) fn def_common_mut(
        &mut self,
        kind: ElementKind,
        name: &str,
    ) -> Option<&mut DefCommon> {
        match kind {
            ElementKind::Primitive => self.primitives.get_mut(name).map(|d| &mut d.common),
            ElementKind::Context => self
                .contexts
                .iter_mut()
                .find(|d| d.common.name == name)
                .map(|d| &mut d.common),
            ElementKind::State => self
                .states
                .iter_mut()
                .find(|d| d.common.name == name)
                .map(|d| &mut d.common),
            ElementKind::Pattern => self
                .patterns
                .iter_mut()
                .find(|d| d.common.name == name)
                .map(|d| &mut d.common),
            ElementKind::Trend => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_guard() {
        let mut common = DefCommon::new("d");
        assert!(!common.created_in(1));
        common.mark_created(1);
        assert!(common.created_in(1));
        assert!(!common.created_in(2));
    }

    #[test]
    fn test_monitor_refs_floor_at_zero() {
        let mut common = DefCommon::new("d");
        common.release_monitor_ref();
        assert_eq!(common.monitor_refs(), 0);
        common.add_monitor_ref();
        common.add_monitor_ref();
        assert!(common.is_monitored());
        common.release_monitor_ref();
        assert!(common.is_monitored());
        common.release_monitor_ref();
        assert!(!common.is_monitored());
    }

    #[test]
    fn test_ontology_from_json_minimal() {
        let json = r#"{
            "name": "lab",
            "element_timeout_ms": 5000,
            "primitives": {"cpu": {"name": "cpu"}},
            "contexts": [],
            "states": [],
            "patterns": []
        }"#;
        let ontology = Ontology::from_json(json).unwrap();
        assert_eq!(ontology.name, "lab");
        assert!(ontology.contains(ElementKind::Primitive, "cpu"));
        assert!(!ontology.contains(ElementKind::Trend, "cpu"));
    }

    #[test]
    fn test_ontology_rejects_sub_second_timeout() {
        let json = r#"{"name": "bad", "element_timeout_ms": 10}"#;
        assert!(Ontology::from_json(json).is_err());
    }
}
