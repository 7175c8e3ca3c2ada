// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! Context definitions — the induction/destruction state machine.
//!
//! A context moves between two states: *absent* (no current instance) and
//! *active* (an open current instance). Induction rules open a context off an
//! anchor element; destruction rules close it. Rules are tried in declared
//! order and the first whose anchor condition holds wins. A cycle with no
//! matching rule is ordinary steady-state behavior, not an error.

use crate::instance::{Element, ElementKind};
use crate::interval::TimeInterval;
use crate::ontology::condition::{NumericRange, SymbolicCondition};
use crate::ontology::DefCommon;
use crate::store::InstanceStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The element an induction/destruction rule's condition is evaluated
/// against. The anchor is always looked up in the *current* tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anchor {
    Primitive { name: String, range: NumericRange },
    State { name: String, value: SymbolicCondition },
    /// Declared in the schema; trend abstraction is unimplemented, so a
    /// trend anchor never matches.
    Trend { name: String, value: SymbolicCondition },
}

impl Anchor {
    pub fn kind(&self) -> ElementKind {
        match self {
            Anchor::Primitive { .. } => ElementKind::Primitive,
            Anchor::State { .. } => ElementKind::State,
            Anchor::Trend { .. } => ElementKind::Trend,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Anchor::Primitive { name, .. }
            | Anchor::State { name, .. }
            | Anchor::Trend { name, .. } => name,
        }
    }

    fn matches(&self, element: &Element) -> bool {
        match self {
            Anchor::Primitive { range, .. } => {
                element.numeric_value().map_or(false, |v| range.contains(v))
            }
            Anchor::State { value, .. } => value.holds(element),
            Anchor::Trend { .. } => false,
        }
    }

    /// The anchor's current instance, if it satisfies the condition.
    fn resolve<'a>(&self, store: &'a InstanceStore) -> Option<&'a Element> {
        store
            .current(self.kind(), self.name())
            .filter(|e| self.matches(e))
    }
}

/// Opens a context when its anchor condition holds.
///
/// The induced context spans from the anchor's start to the rule's pivot
/// (anchor start or end, per `relative_to_start`) extended by `gap_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Induction {
    pub anchor: Anchor,
    pub gap_ms: i64,
    pub relative_to_start: bool,
}

impl Induction {
    fn induce(&self, context_name: &str, store: &InstanceStore) -> Option<Element> {
        let anchor = self.anchor.resolve(store)?;
        let start = anchor.interval.start;
        let pivot = self.pivot(anchor);
        let end = (pivot + Duration::milliseconds(self.gap_ms)).max(start);
        Some(Element::context(context_name, TimeInterval::new(start, end)))
    }

    fn pivot(&self, anchor: &Element) -> DateTime<Utc> {
        if self.relative_to_start {
            anchor.interval.start
        } else {
            anchor.interval.end
        }
    }
}

/// Closes the active context when its anchor condition holds. The closed
/// instance's end is clamped back to the rule's pivot when that tightens it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destruction {
    pub anchor: Anchor,
    pub relative_to_start: bool,
}

impl Destruction {
    fn matched_pivot(&self, store: &InstanceStore) -> Option<DateTime<Utc>> {
        let anchor = self.anchor.resolve(store)?;
        Some(if self.relative_to_start {
            anchor.interval.start
        } else {
            anchor.interval.end
        })
    }
}

/// A context definition: name plus its ordered induction and destruction
/// rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDef {
    #[serde(flatten)]
    pub common: DefCommon,
    pub inductions: Vec<Induction>,
    #[serde(default)]
    pub destructions: Vec<Destruction>,
}

impl ContextDef {
    pub fn new(
        name: impl Into<String>,
        inductions: Vec<Induction>,
        destructions: Vec<Destruction>,
    ) -> Self {
        Self {
            common: DefCommon::new(name),
            inductions,
            destructions,
        }
    }

    /// Try to open a context this cycle. First matching induction wins;
    /// returns whether an instance was created.
    pub fn create_context(&mut self, store: &mut InstanceStore, cycle: u64) -> bool {
        if self.common.created_in(cycle) {
            return false;
        }
        let induced = self
            .inductions
            .iter()
            .find_map(|rule| rule.induce(self.common.name(), store));
        match induced {
            Some(instance) => {
                debug!(context = %self.common.name(), ?instance.interval, "context induced");
                store.set_newest(instance);
                self.common.mark_created(cycle);
                true
            }
            None => false,
        }
    }

    /// Try to close the active context this cycle. Only attempted when a
    /// current instance exists; first matching destruction wins.
    pub fn destroy_context(&mut self, store: &mut InstanceStore, cycle: u64) -> bool {
        if self.common.created_in(cycle) {
            return false;
        }
        if store
            .current(ElementKind::Context, self.common.name())
            .is_none()
        {
            return false;
        }
        let pivot = self
            .destructions
            .iter()
            .find_map(|rule| rule.matched_pivot(store));
        let Some(pivot) = pivot else {
            return false;
        };

        // Checked above; the current slot cannot have changed in between.
        let Some(mut active) = store.take_current(ElementKind::Context, self.common.name()) else {
            return false;
        };
        if pivot > active.interval.start && pivot < active.interval.end {
            active.interval = TimeInterval::new(active.interval.start, pivot);
        }
        debug!(context = %self.common.name(), ?active.interval, "context destroyed");
        store.finalize(active);
        self.common.mark_created(cycle);
        true
    }
}
