// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! Value and duration conditions shared across definition types.

use crate::instance::Element;
use serde::{Deserialize, Serialize};

/// A numeric range test over a primitive's value.
///
/// Unset bounds are unbounded ("*" in the ontology document). Bounds are
/// inclusive unless the corresponding `*_exclusive` flag is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub min_exclusive: bool,
    #[serde(default)]
    pub max_exclusive: bool,
}

impl NumericRange {
    /// An unbounded range that accepts every value.
    pub fn any() -> Self {
        Self {
            min: None,
            max: None,
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    /// An inclusive `[min, max]` range.
    pub fn closed(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    /// An inclusive lower bound with no upper bound.
    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
            min_exclusive: false,
            max_exclusive: false,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        let above = match self.min {
            Some(min) if self.min_exclusive => value > min,
            Some(min) => value >= min,
            None => true,
        };
        let below = match self.max {
            Some(max) if self.max_exclusive => value < max,
            Some(max) => value <= max,
            None => true,
        };
        above && below
    }
}

/// Bounds on an instance's interval duration, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationCondition {
    #[serde(default)]
    pub min_ms: Option<i64>,
    #[serde(default)]
    pub max_ms: Option<i64>,
}

impl DurationCondition {
    pub fn at_least(min_ms: i64) -> Self {
        Self {
            min_ms: Some(min_ms),
            max_ms: None,
        }
    }

    pub fn holds(&self, element: &Element) -> bool {
        let d = element.interval.duration_ms();
        self.min_ms.map_or(true, |min| d >= min) && self.max_ms.map_or(true, |max| d <= max)
    }
}

/// Exact symbolic-equality test over a state's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolicCondition {
    pub value: String,
}

impl SymbolicCondition {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn holds(&self, element: &Element) -> bool {
        element.symbolic_value() == Some(self.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::TimeInterval;
    use chrono::{TimeZone, Utc};

    fn iv(start: i64, end: i64) -> TimeInterval {
        TimeInterval::new(
            Utc.timestamp_millis_opt(start).unwrap(),
            Utc.timestamp_millis_opt(end).unwrap(),
        )
    }

    #[test]
    fn test_numeric_range_bounds() {
        let r = NumericRange::closed(1.0, 5.0);
        assert!(r.contains(1.0));
        assert!(r.contains(5.0));
        assert!(!r.contains(0.99));
        assert!(!r.contains(5.01));

        let open = NumericRange {
            min: Some(1.0),
            max: Some(5.0),
            min_exclusive: true,
            max_exclusive: true,
        };
        assert!(!open.contains(1.0));
        assert!(!open.contains(5.0));
        assert!(open.contains(3.0));

        assert!(NumericRange::any().contains(f64::MAX));
        assert!(NumericRange::at_least(2.0).contains(1e12));
        assert!(!NumericRange::at_least(2.0).contains(1.9));
    }

    #[test]
    fn test_duration_condition() {
        let e = Element::context("c", iv(0, 500));
        assert!(DurationCondition::at_least(500).holds(&e));
        assert!(!DurationCondition::at_least(501).holds(&e));
        let capped = DurationCondition {
            min_ms: None,
            max_ms: Some(499),
        };
        assert!(!capped.holds(&e));
    }

    #[test]
    fn test_symbolic_condition() {
        let e = Element::state("s", "High", iv(0, 1));
        assert!(SymbolicCondition::new("High").holds(&e));
        assert!(!SymbolicCondition::new("Low").holds(&e));
        // Non-state elements never satisfy a symbolic test.
        let c = Element::context("c", iv(0, 1));
        assert!(!SymbolicCondition::new("High").holds(&c));
    }
}
