// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! The per-name, three-tier instance store.
//!
//! Each element name holds up to three retention tiers:
//! - *current* — still open, eligible for extension (an active context, a
//!   state still accepting interpolation).
//! - *newest* — the most recently finalized instance.
//! - *history* — older instances kept for pattern matching, pruned lazily
//!   against the element-timeout horizon.
//!
//! The store exclusively owns all instances. Creation routines take an
//! instance out (`take_current`) when they must widen or finalize it, and
//! hand results back via `set_newest` / `finalize`. Side effects are confined
//! to the named slot; there are no cross-name effects.

use crate::instance::{Element, ElementKind};
use crate::interval::TimeInterval;
use chrono::{DateTime, Duration, Utc};
use fnv::FnvHashMap;
use tracing::trace;

/// Default horizon for history eviction, matching the ontology default.
pub const DEFAULT_ELEMENT_TIMEOUT_MS: i64 = 10_000;

#[derive(Debug, Default)]
struct Tier {
    current: Option<Element>,
    newest: Option<Element>,
    history: Vec<Element>,
}

impl Tier {
    fn evict_older_than(&mut self, horizon: DateTime<Utc>) {
        self.history.retain(|e| e.interval.end >= horizon);
    }
}

/// Three-tier instance storage for every element kind the engine produces.
#[derive(Debug)]
pub struct InstanceStore {
    element_timeout: Duration,
    latest_ingested: Option<DateTime<Utc>>,
    primitives: FnvHashMap<String, Tier>,
    contexts: FnvHashMap<String, Tier>,
    states: FnvHashMap<String, Tier>,
    patterns: FnvHashMap<String, Tier>,
}

impl InstanceStore {
    pub fn new(element_timeout_ms: i64) -> Self {
        Self {
            element_timeout: Duration::milliseconds(element_timeout_ms.max(0)),
            latest_ingested: None,
            primitives: FnvHashMap::default(),
            contexts: FnvHashMap::default(),
            states: FnvHashMap::default(),
            patterns: FnvHashMap::default(),
        }
    }

    fn tiers(&self, kind: ElementKind) -> Option<&FnvHashMap<String, Tier>> {
        match kind {
            ElementKind::Primitive => Some(&self.primitives),
            ElementKind::Context => Some(&self.contexts),
            ElementKind::State => Some(&self.states),
            ElementKind::Pattern => Some(&self.patterns),
            // Trends are declared but never instantiated.
            ElementKind::Trend => None,
        }
    }

    fn tiers_mut(&mut self, kind: ElementKind) -> Option<&mut FnvHashMap<String, Tier>> {
        match kind {
            ElementKind::Primitive => Some(&mut self.primitives),
            ElementKind::Context => Some(&mut self.contexts),
            ElementKind::State => Some(&mut self.states),
            ElementKind::Pattern => Some(&mut self.patterns),
            ElementKind::Trend => None,
        }
    }

    /// The instance still considered open for this name, if any.
    pub fn current(&self, kind: ElementKind, name: &str) -> Option<&Element> {
        self.tiers(kind)?.get(name)?.current.as_ref()
    }

    /// The most recently finalized instance for this name, if any.
    ///
    /// Primitives are never re-opened, so their latest reading answers both
    /// `current` and `newest`.
    pub fn newest(&self, kind: ElementKind, name: &str) -> Option<&Element> {
        let tier = self.tiers(kind)?.get(name)?;
        match kind {
            ElementKind::Primitive => tier.current.as_ref(),
            _ => tier.newest.as_ref(),
        }
    }

    /// Older retained instances for this name, time-ordered, oldest first.
    pub fn history(&self, kind: ElementKind, name: &str) -> &[Element] {
        self.tiers(kind)
            .and_then(|t| t.get(name))
            .map(|t| t.history.as_slice())
            .unwrap_or(&[])
    }

    /// Remove and return the current instance (used before an in-place
    /// interval widening or a context destruction).
    pub fn take_current(&mut self, kind: ElementKind, name: &str) -> Option<Element> {
        self.tiers_mut(kind)?.get_mut(name)?.current.take()
    }

    /// Insert a newly created instance.
    ///
    /// States, contexts, and patterns install as *current* (still open); an
    /// existing current instance is displaced into *newest*, and the displaced
    /// newest into *history*. Primitives are final on arrival: the previous
    /// reading goes straight to history.
    pub fn set_newest(&mut self, element: Element) {
        let kind = element.kind();
        if kind == ElementKind::Primitive {
            let end = element.interval.end;
            self.latest_ingested = Some(self.latest_ingested.map_or(end, |t| t.max(end)));
        }
        let horizon = self.eviction_horizon();

        let Some(tiers) = self.tiers_mut(kind) else {
            return;
        };
        let tier = tiers.entry(element.name.clone()).or_default();

        match kind {
            ElementKind::Primitive => {
                if let Some(prev) = tier.current.take() {
                    tier.history.push(prev);
                }
                tier.current = Some(element);
            }
            _ => {
                if let Some(prev) = tier.current.take() {
                    if let Some(old_newest) = tier.newest.take() {
                        tier.history.push(old_newest);
                    }
                    tier.newest = Some(prev);
                }
                tier.current = Some(element);
            }
        }

        if let Some(horizon) = horizon {
            tier.evict_older_than(horizon);
        }
    }

    /// Install a finalized instance directly into the *newest* slot, leaving
    /// the *current* slot untouched. Used after an interpolation merge (the
    /// widened instance was just taken out of current) and after a context
    /// destruction.
    pub fn finalize(&mut self, element: Element) {
        let horizon = self.eviction_horizon();
        let kind = element.kind();
        let Some(tiers) = self.tiers_mut(kind) else {
            return;
        };
        let tier = tiers.entry(element.name.clone()).or_default();
        if let Some(old_newest) = tier.newest.take() {
            tier.history.push(old_newest);
        }
        tier.newest = Some(element);
        if let Some(horizon) = horizon {
            tier.evict_older_than(horizon);
        }
    }

    /// Latest primitive timestamp seen so far; the reference point for
    /// history eviction.
    pub fn latest_ingested(&self) -> Option<DateTime<Utc>> {
        self.latest_ingested
    }

    fn eviction_horizon(&self) -> Option<DateTime<Utc>> {
        let latest = self.latest_ingested?;
        let horizon = latest - self.element_timeout;
        trace!(%latest, %horizon, "history eviction horizon");
        Some(horizon)
    }

    /// Total number of instances currently retained, across all tiers.
    pub fn len(&self) -> usize {
        [&self.primitives, &self.contexts, &self.states, &self.patterns]
            .iter()
            .flat_map(|m| m.values())
            .map(|t| {
                t.history.len()
                    + usize::from(t.current.is_some())
                    + usize::from(t.newest.is_some())
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new(DEFAULT_ELEMENT_TIMEOUT_MS)
    }
}

/// Convenience for tests and hosts: a zero-length interval at `ms`.
pub fn instant_ms(ms: i64) -> TimeInterval {
    use chrono::TimeZone;
    TimeInterval::instant(Utc.timestamp_millis_opt(ms).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn iv(start: i64, end: i64) -> TimeInterval {
        TimeInterval::new(
            Utc.timestamp_millis_opt(start).unwrap(),
            Utc.timestamp_millis_opt(end).unwrap(),
        )
    }

    #[test]
    fn test_primitive_is_final_on_arrival() {
        let mut store = InstanceStore::default();
        store.set_newest(Element::primitive("cpu", 0.2, iv(0, 10)));
        store.set_newest(Element::primitive("cpu", 0.9, iv(10, 20)));

        let current = store.current(ElementKind::Primitive, "cpu").unwrap();
        assert_eq!(current.numeric_value(), Some(0.9));
        // Newest answers with the same reading — primitives never re-open.
        let newest = store.newest(ElementKind::Primitive, "cpu").unwrap();
        assert_eq!(newest.numeric_value(), Some(0.9));
        assert_eq!(store.history(ElementKind::Primitive, "cpu").len(), 1);
    }

    #[test]
    fn test_state_displacement_chain() {
        let mut store = InstanceStore::new(1_000_000);
        store.set_newest(Element::state("load", "Low", iv(0, 10)));
        assert!(store.newest(ElementKind::State, "load").is_none());

        store.set_newest(Element::state("load", "High", iv(10, 20)));
        assert_eq!(
            store.current(ElementKind::State, "load").unwrap().symbolic_value(),
            Some("High")
        );
        assert_eq!(
            store.newest(ElementKind::State, "load").unwrap().symbolic_value(),
            Some("Low")
        );

        store.set_newest(Element::state("load", "Low", iv(20, 30)));
        assert_eq!(store.history(ElementKind::State, "load").len(), 1);
    }

    #[test]
    fn test_take_current_clears_slot() {
        let mut store = InstanceStore::default();
        store.set_newest(Element::context("attack_window", iv(0, 50)));
        let taken = store.take_current(ElementKind::Context, "attack_window");
        assert!(taken.is_some());
        assert!(store.current(ElementKind::Context, "attack_window").is_none());
    }

    #[test]
    fn test_finalize_goes_to_newest_without_touching_current() {
        let mut store = InstanceStore::default();
        store.set_newest(Element::state("load", "Low", iv(0, 10)));
        let merged = store.take_current(ElementKind::State, "load").unwrap();
        store.finalize(merged);

        assert!(store.current(ElementKind::State, "load").is_none());
        assert_eq!(
            store.newest(ElementKind::State, "load").unwrap().symbolic_value(),
            Some("Low")
        );
    }

    #[test]
    fn test_history_eviction_follows_latest_reading() {
        let mut store = InstanceStore::new(100);
        store.set_newest(Element::primitive("cpu", 0.1, iv(0, 10)));
        store.set_newest(Element::primitive("cpu", 0.2, iv(10, 20)));
        assert_eq!(store.history(ElementKind::Primitive, "cpu").len(), 1);

        // A reading far in the future drags the horizon past the old entries.
        store.set_newest(Element::primitive("cpu", 0.3, iv(500, 510)));
        assert!(store.history(ElementKind::Primitive, "cpu").is_empty());
    }

    #[test]
    fn test_trend_slots_never_resolve() {
        let store = InstanceStore::default();
        assert!(store.current(ElementKind::Trend, "anything").is_none());
        assert!(store.newest(ElementKind::Trend, "anything").is_none());
        assert!(store.history(ElementKind::Trend, "anything").is_empty());
    }
}
