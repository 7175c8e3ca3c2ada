// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! Time intervals and the enclosing-interval operation.
//!
//! Every instance the engine produces carries a [`TimeInterval`]. The one
//! non-obvious operation here is [`TimeInterval::enclosing`]: despite playing
//! the role of an "intersection" in the abstraction algorithm, it computes the
//! *union of bounds* — min of all starts, max of all ends. That behavior is
//! load-bearing: it answers "can these elements be considered co-occurring",
//! not "what is their common sub-interval", and interpolation and context
//! gating both depend on it. Do not replace it with a true intersection.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A closed time interval with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    /// Create an interval. Debug-asserts the ordering invariant.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start <= end, "interval start must not exceed end");
        Self { start, end }
    }

    /// A zero-length interval at a single point in time.
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Duration in whole milliseconds, the unit assessment scoring works in.
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds()
    }

    /// Widen this interval's end to cover `other`. Never shrinks.
    pub fn widen_to(&mut self, other: &TimeInterval) {
        if other.end > self.end {
            self.end = other.end;
        }
    }

    /// The smallest interval covering all given intervals plus an optional
    /// prior bound. Returns `None` when there is nothing to enclose.
    ///
    /// Two-stage calls thread the accumulating bound through `prior`: first
    /// over abstraction sources, then widened again by context sources.
    pub fn enclosing<'a, I>(intervals: I, prior: Option<TimeInterval>) -> Option<TimeInterval>
    where
        I: IntoIterator<Item = &'a TimeInterval>,
    {
        let (mut min, mut max) = match prior {
            Some(p) => (Some(p.start), Some(p.end)),
            None => (None, None),
        };

        for iv in intervals {
            min = Some(min.map_or(iv.start, |m| m.min(iv.start)));
            max = Some(max.map_or(iv.end, |m| m.max(iv.end)));
        }

        match (min, max) {
            (Some(min), Some(max)) if min <= max => Some(TimeInterval::new(min, max)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn iv(start: i64, end: i64) -> TimeInterval {
        TimeInterval::new(ts(start), ts(end))
    }

    #[test]
    fn test_enclosing_is_union_of_bounds() {
        let intervals = [iv(0, 5), iv(3, 10)];
        let result = TimeInterval::enclosing(intervals.iter(), None).unwrap();
        assert_eq!(result, iv(0, 10));
    }

    #[test]
    fn test_enclosing_two_stage_keeps_all_bounds() {
        // First stage over the sources, second stage threads the bound through.
        let first = TimeInterval::enclosing([iv(0, 5)].iter(), None).unwrap();
        let second = TimeInterval::enclosing([iv(2, 3)].iter(), Some(first)).unwrap();
        assert_eq!(second, iv(0, 5));

        let widened = TimeInterval::enclosing([iv(3, 10)].iter(), Some(second)).unwrap();
        assert_eq!(widened, iv(0, 10));
    }

    #[test]
    fn test_enclosing_empty_input() {
        assert_eq!(TimeInterval::enclosing([].iter(), None), None);
        // A prior bound alone survives.
        assert_eq!(TimeInterval::enclosing([].iter(), Some(iv(1, 2))), Some(iv(1, 2)));
    }

    #[test]
    fn test_widen_never_shrinks() {
        let mut a = iv(0, 100);
        a.widen_to(&iv(150, 200));
        assert_eq!(a, iv(0, 200));

        a.widen_to(&iv(10, 20));
        assert_eq!(a, iv(0, 200));
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(iv(500, 1500).duration_ms(), 1000);
        assert_eq!(TimeInterval::instant(ts(7)).duration_ms(), 0);
    }
}
