// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! The cycle driver.
//!
//! [`Engine::tick`] is the only entry point for advancing time: it ingests a
//! batch of raw readings, then sweeps the ontology in fixed order — contexts
//! (induction, then destruction), states, patterns — and finally scores the
//! monitored threat assessments. Definitions run in their declared order
//! within each phase, so a state created this cycle is visible to the states
//! and patterns declared after it.

use crate::instance::Element;
use crate::interval::TimeInterval;
use crate::ontology::Ontology;
use crate::store::InstanceStore;
use crate::threats::{Detection, PreferenceStore, ThreatAssessment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One raw sensor reading, as delivered by the host's acquisition layer.
#[derive(Debug, Clone, Deserialize)]
pub struct Reading {
    pub name: String,
    pub value: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// What one call to [`Engine::tick`] produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickSummary {
    pub cycle: u64,
    pub readings_ingested: usize,
    pub contexts_created: usize,
    pub contexts_destroyed: usize,
    pub states_created: usize,
    pub patterns_created: usize,
    pub detections: Vec<Detection>,
}

/// The assembled abstraction engine: one ontology, one instance store, and
/// the configured threat assessments.
pub struct Engine {
    ontology: Ontology,
    store: InstanceStore,
    assessments: Vec<ThreatAssessment>,
    cycle: u64,
}

impl Engine {
    /// Assemble an engine. Assessments whose generating definition the
    /// ontology does not declare are dropped with a warning; everything else
    /// gets its persisted monitoring preference applied, with propagation.
    pub fn new(
        mut ontology: Ontology,
        assessments: Vec<ThreatAssessment>,
        preferences: &mut dyn PreferenceStore,
    ) -> Self {
        let store = InstanceStore::new(ontology.element_timeout_ms);
        let assessments = assessments
            .into_iter()
            .filter_map(|mut assessment| {
                match assessment.set_initially_monitored(&mut ontology, preferences) {
                    Ok(()) => Some(assessment),
                    Err(err) => {
                        warn!(title = %assessment.title, %err, "dropping invalid assessment");
                        None
                    }
                }
            })
            .collect();
        Self {
            ontology,
            store,
            assessments,
            cycle: 0,
        }
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    pub fn assessments(&self) -> &[ThreatAssessment] {
        &self.assessments
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Toggle one assessment (by title) at runtime, propagating the change
    /// through the definition graph and persisting the preference.
    pub fn set_assessment_monitored(
        &mut self,
        title: &str,
        active: bool,
        preferences: &mut dyn PreferenceStore,
    ) -> bool {
        let Some(assessment) = self.assessments.iter_mut().find(|a| a.title == title) else {
            return false;
        };
        assessment.set_monitored(&mut self.ontology, active);
        preferences.put(title, active);
        true
    }

    /// Run one full abstraction cycle over a batch of readings.
    pub fn tick(&mut self, readings: Vec<Reading>) -> TickSummary {
        self.cycle += 1;
        let cycle = self.cycle;
        let mut summary = TickSummary {
            cycle,
            ..TickSummary::default()
        };

        for reading in readings {
            if !self
                .ontology
                .contains(crate::instance::ElementKind::Primitive, &reading.name)
            {
                warn!(name = %reading.name, "reading for undeclared primitive ignored");
                continue;
            }
            let interval = TimeInterval::new(reading.start, reading.end.max(reading.start));
            self.store
                .set_newest(Element::primitive(&reading.name, reading.value, interval));
            summary.readings_ingested += 1;
        }

        // Each definition borrows the store mutably while the rest of the
        // ontology stays untouched, so the phases split the borrow by field.
        let store = &mut self.store;
        for context in self.ontology.contexts_mut() {
            if context.create_context(store, cycle) {
                summary.contexts_created += 1;
            }
            if context.destroy_context(store, cycle) {
                summary.contexts_destroyed += 1;
            }
        }
        for state in self.ontology.states_mut() {
            if state.create_state(store, cycle) {
                summary.states_created += 1;
            }
        }
        for pattern in self.ontology.patterns_mut() {
            summary.patterns_created += pattern.create_pattern(store, cycle);
        }

        summary.detections = self
            .assessments
            .iter()
            .filter_map(|a| a.evaluate(&self.store))
            .collect();

        debug!(
            cycle,
            readings = summary.readings_ingested,
            contexts = summary.contexts_created,
            states = summary.states_created,
            patterns = summary.patterns_created,
            detections = summary.detections.len(),
            "cycle complete"
        );
        summary
    }
}
