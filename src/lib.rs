// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sentra — knowledge-based temporal abstraction for sensor streams.
//!
//! Raw readings arrive cycle by cycle; a declarative ontology turns them into
//! symbolic facts (contexts, states, patterns), and threat assessments score
//! the facts that matter. The [`engine::Engine`] owns the whole pipeline; the
//! host feeds it readings and consumes the per-cycle summaries.

pub mod engine;
pub mod instance;
pub mod interval;
pub mod ontology;
pub mod store;
pub mod threats;

pub use engine::{Engine, Reading, TickSummary};
pub use instance::{Element, ElementKind};
pub use interval::TimeInterval;
pub use ontology::Ontology;
pub use store::InstanceStore;
pub use threats::{
    Detection, EngineError, MemoryPreferences, PreferenceStore, ThreatAssessment, Trigger,
};
