// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pattern definitions — multi-element constraint search.
//!
//! A pattern declares `k` ordinal positions, each with an eligibility
//! predicate over store instances, plus pairwise constraints between
//! ordinals. At load time the constraints are rearranged into an order in
//! which every constraint has at least one endpoint already bound by a prior
//! step; per cycle, partial matches are then extended left-to-right through
//! that order without backtracking. The rearrangement is what keeps the join
//! incremental instead of exponential — the order must be preserved exactly.

use crate::instance::{Element, ElementKind};
use crate::ontology::condition::{DurationCondition, SymbolicCondition};
use crate::ontology::DefCommon;
use crate::store::InstanceStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Temporal relation between the instances bound to a constraint's two
/// ordinals (first argument is the constraint's `first` side).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "relation", rename_all = "snake_case")]
pub enum TemporalRelation {
    /// `first` ends before `second` starts, with the gap between them inside
    /// the given bounds.
    Before {
        #[serde(default)]
        min_gap_ms: i64,
        #[serde(default)]
        max_gap_ms: Option<i64>,
    },
    /// The two intervals share at least one point in time.
    Overlaps,
    /// `first` lies entirely within `second`.
    During,
    /// No temporal requirement.
    Any,
}

impl TemporalRelation {
    fn holds(&self, first: &Element, second: &Element) -> bool {
        let (a, b) = (&first.interval, &second.interval);
        match self {
            TemporalRelation::Before {
                min_gap_ms,
                max_gap_ms,
            } => {
                let gap = (b.start - a.end).num_milliseconds();
                gap >= *min_gap_ms && max_gap_ms.map_or(true, |max| gap <= max)
            }
            TemporalRelation::Overlaps => a.start <= b.end && b.start <= a.end,
            TemporalRelation::During => b.start <= a.start && a.end <= b.end,
            TemporalRelation::Any => true,
        }
    }
}

/// Optional value relation between the two bound instances' symbolic values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueRelation {
    Equal,
    NotEqual,
}

impl ValueRelation {
    fn holds(&self, first: &Element, second: &Element) -> bool {
        match (first.symbolic_value(), second.symbolic_value()) {
            (Some(a), Some(b)) => match self {
                ValueRelation::Equal => a == b,
                ValueRelation::NotEqual => a != b,
            },
            _ => false,
        }
    }
}

/// A relational predicate over an unordered pair of ordinals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseConstraint {
    pub first: usize,
    pub second: usize,
    #[serde(flatten)]
    pub temporal: TemporalRelation,
    #[serde(default)]
    pub value: Option<ValueRelation>,
}

impl PairwiseConstraint {
    fn holds(&self, first: &Element, second: &Element) -> bool {
        self.temporal.holds(first, second)
            && self.value.map_or(true, |v| v.holds(first, second))
    }
}

/// Eligibility predicate for one ordinal position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternElement {
    pub kind: ElementKind,
    pub name: String,
    #[serde(default)]
    pub duration: Option<DurationCondition>,
    #[serde(default)]
    pub value: Option<SymbolicCondition>,
}

impl PatternElement {
    pub fn new(kind: ElementKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            duration: None,
            value: None,
        }
    }

    pub fn with_duration(mut self, duration: DurationCondition) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(SymbolicCondition::new(value));
        self
    }

    fn eligible(&self, element: &Element) -> bool {
        self.duration.as_ref().map_or(true, |d| d.holds(element))
            && self.value.as_ref().map_or(true, |v| v.holds(element))
    }

    /// Every eligible instance of this element currently retained: the newest
    /// finalized one, the open current one, and the surviving history.
    /// Trends never yield candidates.
    fn candidates(&self, store: &InstanceStore) -> Vec<Element> {
        let mut out = Vec::new();
        if self.kind == ElementKind::Trend {
            return out;
        }
        // Primitives answer newest and current with the same reading.
        if self.kind != ElementKind::Primitive {
            if let Some(e) = store.newest(self.kind, &self.name) {
                if self.eligible(e) {
                    out.push(e.clone());
                }
            }
        }
        if let Some(e) = store.current(self.kind, &self.name) {
            if self.eligible(e) {
                out.push(e.clone());
            }
        }
        for e in store.history(self.kind, &self.name) {
            if self.eligible(e) {
                out.push(e.clone());
            }
        }
        out
    }
}

/// An in-progress binding of ordinals to candidate instances.
type Partial = Vec<Option<Element>>;

/// A pattern definition: ordinal element predicates plus pairwise
/// constraints, with the precomputed constraint visitation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDef {
    #[serde(flatten)]
    pub common: DefCommon,
    pub elements: Vec<PatternElement>,
    #[serde(default)]
    pub constraints: Vec<PairwiseConstraint>,
    /// Indices into `constraints` in processing order. Recomputed at load
    /// time; never serialized.
    #[serde(skip)]
    order: Vec<usize>,
}

impl PatternDef {
    pub fn new(
        name: impl Into<String>,
        elements: Vec<PatternElement>,
        constraints: Vec<PairwiseConstraint>,
    ) -> Self {
        let mut def = Self {
            common: DefCommon::new(name),
            elements,
            constraints,
            order: Vec::new(),
        };
        def.rearrange_constraints();
        def
    }

    /// Produce the constraint visitation order: a depth-first walk from
    /// ordinal 0 that, on first reaching an unvisited ordinal `j` from a
    /// visited `i`, emits `(i,j)` and also emits any constraint between `j`
    /// and an already-visited ordinal before descending. Constraints whose
    /// component is unreachable from ordinal 0 are dropped from the order;
    /// their ordinals degrade to independent matching.
    pub(crate) fn rearrange_constraints(&mut self) {
        let k = self.elements.len();
        let mut adjacency = vec![vec![None; k]; k];
        for (ci, c) in self.constraints.iter().enumerate() {
            if c.first < k && c.second < k && c.first != c.second {
                adjacency[c.first][c.second] = Some(ci);
                adjacency[c.second][c.first] = Some(ci);
            }
        }

        let mut used = vec![false; k];
        let mut emitted = vec![false; self.constraints.len()];
        let mut order = Vec::with_capacity(self.constraints.len());
        if k > 0 {
            used[0] = true;
            Self::visit(0, None, &adjacency, &mut used, &mut emitted, &mut order);
        }
        debug!(pattern = %self.common.name(), ?order, "constraints rearranged");
        self.order = order;
    }

    fn visit(
        i: usize,
        from: Option<usize>,
        adjacency: &[Vec<Option<usize>>],
        used: &mut [bool],
        emitted: &mut [bool],
        order: &mut Vec<usize>,
    ) {
        let k = used.len();
        // Back edges to already-visited ordinals come first.
        for j in 0..k {
            if Some(j) == from || !used[j] {
                continue;
            }
            if let Some(ci) = adjacency[i][j] {
                if !emitted[ci] {
                    emitted[ci] = true;
                    order.push(ci);
                }
            }
        }
        // Then tree edges, descending depth-first.
        for j in 0..k {
            if Some(j) == from || used[j] {
                continue;
            }
            if let Some(ci) = adjacency[i][j] {
                used[j] = true;
                if !emitted[ci] {
                    emitted[ci] = true;
                    order.push(ci);
                }
                Self::visit(j, Some(i), adjacency, used, emitted, order);
            }
        }
    }

    /// Run the match for one cycle. Returns the number of pattern instances
    /// installed (zero on any abort).
    pub fn create_pattern(&mut self, store: &mut InstanceStore, cycle: u64) -> usize {
        if self.common.created_in(cycle) {
            return 0;
        }
        let k = self.elements.len();
        if k == 0 {
            return 0;
        }

        let mut candidates: Vec<Vec<Element>> = Vec::with_capacity(k);
        for (ordinal, element) in self.elements.iter().enumerate() {
            let list = element.candidates(store);
            if list.is_empty() {
                debug!(pattern = %self.common.name(), ordinal, "no eligible candidates");
                return 0;
            }
            candidates.push(list);
        }

        // Seed one partial per candidate of ordinal 0.
        let mut partials: Vec<Partial> = candidates[0]
            .iter()
            .map(|e| {
                let mut slots: Partial = vec![None; k];
                slots[0] = Some(e.clone());
                slots
            })
            .collect();

        for &ci in &self.order {
            let constraint = &self.constraints[ci];
            partials = Self::apply_constraint(constraint, partials, &candidates);
            if partials.is_empty() {
                debug!(
                    pattern = %self.common.name(),
                    first = constraint.first,
                    second = constraint.second,
                    "no partial satisfies constraint"
                );
                return 0;
            }
        }

        // Ordinals never touched by a constraint combine independently.
        for ordinal in 0..k {
            let untouched = partials
                .first()
                .map_or(false, |p| p[ordinal].is_none());
            if !untouched {
                continue;
            }
            let mut expanded = Vec::with_capacity(partials.len() * candidates[ordinal].len());
            for partial in &partials {
                for candidate in &candidates[ordinal] {
                    let mut next = partial.clone();
                    next[ordinal] = Some(candidate.clone());
                    expanded.push(next);
                }
            }
            partials = expanded;
        }

        let count = partials.len();
        for partial in partials {
            let members: Vec<Element> = partial.into_iter().flatten().collect();
            debug_assert_eq!(members.len(), k, "complete partial must bind every ordinal");
            store.set_newest(Element::pattern(self.common.name(), members));
        }
        debug!(pattern = %self.common.name(), count, "patterns created");
        self.common.mark_created(cycle);
        count
    }

    /// One incremental join step. All partials share the same bound/unbound
    /// shape, so the shape of the first partial decides the step kind.
    fn apply_constraint(
        constraint: &PairwiseConstraint,
        partials: Vec<Partial>,
        candidates: &[Vec<Element>],
    ) -> Vec<Partial> {
        let (first, second) = (constraint.first, constraint.second);
        let first_bound = partials.first().map_or(false, |p| p[first].is_some());
        let second_bound = partials.first().map_or(false, |p| p[second].is_some());

        match (first_bound, second_bound) {
            // Pure filter over existing bindings.
            (true, true) => partials
                .into_iter()
                .filter(|p| match (&p[first], &p[second]) {
                    (Some(a), Some(b)) => constraint.holds(a, b),
                    _ => false,
                })
                .collect(),
            // Fan out over the unbound side's candidates.
            (true, false) => {
                let mut next = Vec::new();
                for partial in partials {
                    let Some(bound) = partial[first].clone() else {
                        continue;
                    };
                    for candidate in &candidates[second] {
                        if constraint.holds(&bound, candidate) {
                            let mut extended = partial.clone();
                            extended[second] = Some(candidate.clone());
                            next.push(extended);
                        }
                    }
                }
                next
            }
            (false, true) => {
                let mut next = Vec::new();
                for partial in partials {
                    let Some(bound) = partial[second].clone() else {
                        continue;
                    };
                    for candidate in &candidates[first] {
                        if constraint.holds(candidate, &bound) {
                            let mut extended = partial.clone();
                            extended[first] = Some(candidate.clone());
                            next.push(extended);
                        }
                    }
                }
                next
            }
            // Only possible for the first constraint out of ordinal 0.
            (false, false) => {
                let mut next = Vec::new();
                for partial in partials {
                    for a in &candidates[first] {
                        for b in &candidates[second] {
                            if constraint.holds(a, b) {
                                let mut extended = partial.clone();
                                extended[first] = Some(a.clone());
                                extended[second] = Some(b.clone());
                                next.push(extended);
                            }
                        }
                    }
                }
                next
            }
        }
    }
}
