// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! Element instances — the facts the engine derives and stores.
//!
//! An [`Element`] is one concrete occurrence of a named definition: a raw
//! primitive reading, an open context, a symbolic state, or a composite
//! pattern. Instances are owned by the store; creation routines only hand
//! finished instances over and take them back out when a tier promotion or
//! an in-place interval widening is required.

use crate::interval::TimeInterval;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of an element or of a definition reference.
///
/// `Trend` is declared in the ontology schema but has no implemented
/// abstraction: any reference to a trend resolves to nothing and behaves as an
/// unconditional no-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Primitive,
    Context,
    State,
    Trend,
    Pattern,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElementKind::Primitive => "primitive",
            ElementKind::Context => "context",
            ElementKind::State => "state",
            ElementKind::Trend => "trend",
            ElementKind::Pattern => "pattern",
        };
        f.write_str(s)
    }
}

/// Kind-specific payload of an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementBody {
    /// A raw numeric reading.
    Primitive { value: f64 },
    /// Existence marks "condition X held"; no value.
    Context,
    /// A symbolic abstraction value.
    State { value: String },
    /// The ordered member instances that satisfied the pattern's constraints.
    Pattern { members: Vec<Element> },
}

/// One concrete instance of a named definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Name of the producing definition.
    pub name: String,
    pub interval: TimeInterval,
    #[serde(flatten)]
    pub body: ElementBody,
}

impl Element {
    pub fn primitive(name: impl Into<String>, value: f64, interval: TimeInterval) -> Self {
        Self {
            name: name.into(),
            interval,
            body: ElementBody::Primitive { value },
        }
    }

    pub fn context(name: impl Into<String>, interval: TimeInterval) -> Self {
        Self {
            name: name.into(),
            interval,
            body: ElementBody::Context,
        }
    }

    pub fn state(name: impl Into<String>, value: impl Into<String>, interval: TimeInterval) -> Self {
        Self {
            name: name.into(),
            interval,
            body: ElementBody::State {
                value: value.into(),
            },
        }
    }

    /// Build a pattern instance; the interval is the enclosing union of the
    /// members' intervals. Panics in debug builds if `members` is empty (a
    /// pattern definition always has at least one ordinal).
    pub fn pattern(name: impl Into<String>, members: Vec<Element>) -> Self {
        let interval = TimeInterval::enclosing(members.iter().map(|m| &m.interval), None);
        debug_assert!(interval.is_some(), "pattern must have at least one member");
        Self {
            name: name.into(),
            interval: interval.unwrap_or_else(|| {
                TimeInterval::instant(chrono::DateTime::<chrono::Utc>::MIN_UTC)
            }),
            body: ElementBody::Pattern { members },
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self.body {
            ElementBody::Primitive { .. } => ElementKind::Primitive,
            ElementBody::Context => ElementKind::Context,
            ElementBody::State { .. } => ElementKind::State,
            ElementBody::Pattern { .. } => ElementKind::Pattern,
        }
    }

    /// The numeric value, for primitives.
    pub fn numeric_value(&self) -> Option<f64> {
        match self.body {
            ElementBody::Primitive { value } => Some(value),
            _ => None,
        }
    }

    /// The symbolic value, for states.
    pub fn symbolic_value(&self) -> Option<&str> {
        match &self.body {
            ElementBody::State { value } => Some(value.as_str()),
            _ => None,
        }
    }
}
