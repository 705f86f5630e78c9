// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Regular time grids.

/// Ordered, deduplicated time keys of one group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    points: Vec<i64>,
}

impl Grid {
    /// Points `min, min + step, ...` up to and including `max`. Empty when
    /// `min > max`; stops early if the next point would overflow.
    #[must_use]
    pub fn generate(min: i64, max: i64, step: i64) -> Self {
        let mut points = Vec::new();
        if step <= 0 || min > max {
            return Self { points };
        }
        if let Some(span) = max.checked_sub(min) {
            points.reserve(usize::try_from(span / step).unwrap_or(0).saturating_add(1).min(1 << 16));
        }
        let mut point = min;
        while point <= max {
            points.push(point);
            match point.checked_add(step) {
                Some(next) => point = next,
                None => break,
            }
        }
        Self { points }
    }

    /// Grid from `min` up to `target`.
    ///
    /// When `target < min` the group's own time keys are returned, sorted and
    /// deduplicated. Otherwise points run from `min` through `target + step`
    /// and are kept when they are at or before the target, or fall on the
    /// same UTC day as the target. `units_per_day` is `None` for integer
    /// domains, which have no calendar day.
    #[must_use]
    pub fn forward(
        min: i64,
        target: i64,
        step: i64,
        units_per_day: Option<i64>,
        original_times: &[i64],
    ) -> Self {
        if target < min {
            let mut points = original_times.to_vec();
            points.sort_unstable();
            points.dedup();
            return Self { points };
        }
        if step <= 0 {
            return Self::default();
        }

        let bound = target.checked_add(step).unwrap_or(i64::MAX);
        let same_day = |point: i64| match units_per_day {
            Some(unit) if unit > 0 => point.div_euclid(unit) == target.div_euclid(unit),
            _ => false,
        };

        let mut points = Vec::new();
        let mut point = min;
        while point <= bound {
            if point <= target || same_day(point) {
                points.push(point);
            }
            match point.checked_add(step) {
                Some(next) => point = next,
                None => break,
            }
        }
        Self { points }
    }

    #[must_use]
    pub fn points(&self) -> &[i64] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
