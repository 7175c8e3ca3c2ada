// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! Threat assessments — certainty scoring layered on top of the ontology.
//!
//! An assessment watches one generating definition and, while monitored,
//! fires a [`Detection`] whenever that definition's latest instance satisfies
//! the trigger's conditions. Certainty grows linearly with the instance's
//! duration relative to the configured minimum and is capped at 100.
//! Monitoring toggles propagate through the definition graph (see
//! `ontology::monitor`); the initial setting comes from an injected
//! preference store keyed by the assessment title.

use crate::instance::{Element, ElementKind};
use crate::interval::TimeInterval;
use crate::ontology::{Ontology, SymbolicCondition};
use crate::store::InstanceStore;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Library error type. Ordinary non-matching cycles never produce errors;
/// only malformed configuration does.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An assessment references a definition the ontology does not declare.
    /// The assessment is invalid and must be dropped, never retried.
    #[error("unknown {kind} definition: {name}")]
    UnknownDefinition { kind: ElementKind, name: String },
}

/// Persisted monitoring preferences, keyed by assessment title. Injected at
/// startup; the engine never touches a global store.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<bool>;
    fn put(&mut self, key: &str, value: bool);
}

/// In-memory preference store for hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: FnvHashMap<String, bool>,
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<bool> {
        self.values.get(key).copied()
    }

    fn put(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), value);
    }
}

/// What an assessment is generated from: a definition reference plus the
/// conditions its latest instance must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: ElementKind,
    pub name: String,
    /// Optional symbolic-value condition (states only).
    #[serde(default)]
    pub value: Option<SymbolicCondition>,
    /// Minimum qualifying duration; also the denominator of the certainty
    /// ratio.
    pub min_duration_ms: i64,
}

impl Trigger {
    /// The instance the assessment scores this cycle: the open current one,
    /// else the newest finalized one.
    fn resolve<'a>(&self, store: &'a InstanceStore) -> Option<&'a Element> {
        store
            .current(self.kind, &self.name)
            .or_else(|| store.newest(self.kind, &self.name))
    }
}

/// A fired assessment, as reported in the tick summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub title: String,
    pub description: String,
    pub certainty: u8,
    pub interval: TimeInterval,
}

/// A configured threat assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Certainty at exactly the minimum qualifying duration, 0–100.
    pub base_certainty: u8,
    pub trigger: Trigger,
    #[serde(default)]
    monitored: bool,
}

impl ThreatAssessment {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        base_certainty: u8,
        trigger: Trigger,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            base_certainty: base_certainty.min(100),
            trigger,
            monitored: false,
        }
    }

    pub fn is_monitored(&self) -> bool {
        self.monitored
    }

    /// Certainty for a triggering instance: the base certainty scaled by the
    /// instance duration over the minimum duration, floored, capped at 100.
    pub fn certainty(&self, element: &Element) -> u8 {
        if self.trigger.min_duration_ms <= 0 {
            return self.base_certainty.min(100);
        }
        let ratio = element.interval.duration_ms() as f64 / self.trigger.min_duration_ms as f64;
        let scaled = (f64::from(self.base_certainty) * ratio).floor();
        scaled.clamp(0.0, 100.0) as u8
    }

    /// Apply the persisted preference and, when monitored, propagate over the
    /// generating definition's subgraph. Fails when the generating definition
    /// is not declared — such an assessment must be dropped by the caller.
    pub fn set_initially_monitored(
        &mut self,
        ontology: &mut Ontology,
        preferences: &mut dyn PreferenceStore,
    ) -> Result<(), EngineError> {
        if !ontology.contains(self.trigger.kind, &self.trigger.name) {
            return Err(EngineError::UnknownDefinition {
                kind: self.trigger.kind,
                name: self.trigger.name.clone(),
            });
        }
        self.monitored = preferences.get(&self.title).unwrap_or(self.monitored);
        if self.monitored {
            preferences.put(&self.title, true);
            ontology.set_initially_monitored(self.trigger.kind, &self.trigger.name);
        }
        Ok(())
    }

    /// Toggle monitoring at runtime, propagating the change.
    pub fn set_monitored(&mut self, ontology: &mut Ontology, active: bool) {
        self.monitored = active;
        ontology.set_monitored(self.trigger.kind, &self.trigger.name, active);
    }

    /// Score the trigger's latest instance, if monitored and satisfied.
    pub fn evaluate(&self, store: &InstanceStore) -> Option<Detection> {
        if !self.monitored {
            return None;
        }
        let instance = self.trigger.resolve(store)?;
        if let Some(cond) = &self.trigger.value {
            if !cond.holds(instance) {
                return None;
            }
        }
        Some(Detection {
            title: self.title.clone(),
            description: self.description.clone(),
            certainty: self.certainty(instance),
            interval: instance.interval,
        })
    }
}
