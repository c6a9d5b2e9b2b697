//! 闭区间集合代数：公式的满足集就是时间轴上的 `IntervalSet`。
//!
//! 集合始终保持规范形式：按起点排序、互不相交，相接或重叠的区间被合并。
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::distribution::{Distribution, DistributionError};

/// Gaps no wider than this are closed when normalizing.
pub const MERGE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    /// `None` when an endpoint is NaN or `start > end`.
    pub fn new(start: f64, end: f64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn point(at: f64) -> Self {
        Self { start: at, end: at }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

fn coalesce_sorted(intervals: impl Iterator<Item = Interval>) -> Vec<Interval> {
    intervals
        .coalesce(|a, b| {
            if b.start <= a.end + MERGE_EPSILON {
                Ok(Interval {
                    start: a.start,
                    end: a.end.max(b.end),
                })
            } else {
                Err((a, b))
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `[lo, hi]`; empty when `lo > hi`. `hi` may be `+∞`.
    pub fn full(lo: f64, hi: f64) -> Self {
        Self {
            intervals: Interval::new(lo, hi).into_iter().collect(),
        }
    }

    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut raw: Vec<Interval> = intervals
            .into_iter()
            .filter(|iv| iv.start <= iv.end)
            .collect();
        raw.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));
        Self {
            intervals: coalesce_sorted(raw.into_iter()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn as_slice(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn union(&self, other: &Self) -> Self {
        let merged = self
            .intervals
            .iter()
            .merge_by(other.intervals.iter(), |a, b| a.start <= b.start)
            .copied();
        Self {
            intervals: coalesce_sorted(merged),
        }
    }

    /// Overlap of positive length. Every zero-length overlap is dropped,
    /// points included, so `a ∩ complement(a)` is always empty.
    pub fn intersect(&self, other: &Self) -> Self {
        self.overlap(other, false)
    }

    /// Intersection of the closed sets: touching endpoints and points lying
    /// in the other set survive.
    pub fn intersect_closed(&self, other: &Self) -> Self {
        self.overlap(other, true)
    }

    fn overlap(&self, other: &Self, keep_touching: bool) -> Self {
        let (a, b) = (&self.intervals, &other.intervals);
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::new();
        while i < a.len() && j < b.len() {
            let (x, y) = (a[i], b[j]);
            let lo = x.start.max(y.start);
            let hi = x.end.min(y.end);
            let keep = hi - lo > MERGE_EPSILON || (keep_touching && lo <= hi);
            if keep {
                out.push(Interval { start: lo, end: hi });
            }
            if x.end < y.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self {
            intervals: coalesce_sorted(out.into_iter()),
        }
    }

    /// Closure of `[lo, hi]` minus the set. Isolated points have no interior
    /// and leave the result unsplit.
    pub fn complement(&self, lo: f64, hi: f64) -> Self {
        let mut out = Vec::new();
        let mut cursor = lo;
        for iv in &self.intervals {
            if iv.is_point() || iv.end < lo {
                continue;
            }
            if iv.start > hi {
                break;
            }
            if iv.start - cursor > MERGE_EPSILON {
                out.push(Interval {
                    start: cursor,
                    end: iv.start,
                });
            }
            cursor = cursor.max(iv.end);
        }
        if hi - cursor > MERGE_EPSILON {
            out.push(Interval {
                start: cursor,
                end: hi,
            });
        }
        Self {
            intervals: coalesce_sorted(out.into_iter()),
        }
    }

    pub fn contains(&self, t: f64) -> bool {
        let idx = self.intervals.partition_point(|iv| iv.start <= t);
        idx > 0 && self.intervals[idx - 1].end >= t
    }

    /// Total length.
    pub fn measure(&self) -> f64 {
        self.intervals.iter().map(Interval::length).sum()
    }

    pub fn shift(&self, delta: f64) -> Self {
        Self {
            intervals: self
                .intervals
                .iter()
                .map(|iv| Interval {
                    start: iv.start + delta,
                    end: iv.end + delta,
                })
                .collect(),
        }
    }

    pub fn clip(&self, lo: f64, hi: f64) -> Self {
        self.intersect_closed(&Self::full(lo, hi))
    }

    /// `Σ (F(end) − F(start⁻))` over the disjoint intervals, clamped to `[0, 1]`.
    pub fn measure_against(&self, distribution: &Distribution) -> Result<f64, DistributionError> {
        let mut total = 0.0;
        for iv in &self.intervals {
            total += distribution.mass(iv.start, iv.end)?;
        }
        Ok(total.clamp(0.0, 1.0))
    }
}

impl FromIterator<Interval> for IntervalSet {
    fn from_iter<I: IntoIterator<Item = Interval>>(iter: I) -> Self {
        Self::from_intervals(iter)
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals.is_empty() {
            return write!(f, "∅");
        }
        write!(f, "{}", self.intervals.iter().join(" ∪ "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(pairs: &[(f64, f64)]) -> IntervalSet {
        pairs
            .iter()
            .map(|&(s, e)| Interval::new(s, e).unwrap())
            .collect()
    }

    #[test]
    fn normalization_merges_touching_and_sorts() {
        let s = set(&[(4.0, 6.0), (0.0, 1.0), (1.0, 2.0), (5.0, 8.0)]);
        assert_eq!(s, set(&[(0.0, 2.0), (4.0, 8.0)]));
        assert_eq!(s.to_string(), "[0, 2] ∪ [4, 8]");
        assert_eq!(IntervalSet::empty().to_string(), "∅");
        assert!(Interval::new(3.0, 1.0).is_none());
        assert!(Interval::new(f64::NAN, 1.0).is_none());
    }

    #[test]
    fn complement_within_horizon() {
        let p = set(&[(2.0, 4.0)]);
        assert_eq!(p.complement(0.0, 10.0), set(&[(0.0, 2.0), (4.0, 10.0)]));
        assert_eq!(IntervalSet::empty().complement(0.0, 5.0), set(&[(0.0, 5.0)]));
        assert!(set(&[(0.0, 5.0)]).complement(0.0, 5.0).is_empty());
        assert_eq!(
            p.complement(0.0, f64::INFINITY),
            set(&[(0.0, 2.0), (4.0, f64::INFINITY)])
        );
    }

    #[test]
    fn zero_length_overlaps_only_survive_closed_intersection() {
        let a = set(&[(0.0, 2.0)]);
        let b = set(&[(2.0, 4.0)]);
        assert!(a.intersect(&b).is_empty());
        assert_eq!(a.intersect_closed(&b), IntervalSet::from_intervals([Interval::point(2.0)]));
        let point = IntervalSet::from_intervals([Interval::point(5.0)]);
        assert!(point.intersect(&set(&[(0.0, 10.0)])).is_empty());
        assert_eq!(point.intersect_closed(&set(&[(0.0, 10.0)])), point);
        assert!(point.contains(5.0));
        assert!(!point.contains(5.1));
    }

    #[test]
    fn points_do_not_split_the_complement() {
        let point = IntervalSet::from_intervals([Interval::point(5.0)]);
        assert_eq!(point.complement(0.0, 10.0), set(&[(0.0, 10.0)]));
        assert_eq!(point.complement(0.0, 10.0).len(), 1);

        let mixed = IntervalSet::from_intervals([Interval::point(5.0), Interval::new(7.0, 8.0).unwrap()]);
        let rest = mixed.complement(0.0, 10.0);
        assert_eq!(rest, set(&[(0.0, 7.0), (8.0, 10.0)]));
        assert!(mixed.intersect(&rest).is_empty());
        assert_eq!(
            mixed.intersect_closed(&rest),
            IntervalSet::from_intervals([Interval::point(5.0), Interval::point(7.0), Interval::point(8.0)])
        );
    }

    #[test]
    fn contains_uses_closed_bounds() {
        let s = set(&[(0.0, 2.0), (4.0, 10.0)]);
        assert!(s.contains(0.0));
        assert!(s.contains(2.0));
        assert!(!s.contains(3.0));
        assert!(s.contains(10.0));
        assert!(!s.contains(-1.0));
    }

    #[test]
    fn shift_clip_and_measure() {
        let s = set(&[(1.0, 3.0), (5.0, 9.0)]);
        assert_eq!(s.measure(), 6.0);
        assert_eq!(s.shift(-2.0), set(&[(-1.0, 1.0), (3.0, 7.0)]));
        assert_eq!(s.shift(-2.0).clip(0.0, f64::INFINITY), set(&[(0.0, 1.0), (3.0, 7.0)]));
    }

    #[test]
    fn measure_against_uniform() {
        let uniform = Distribution::Uniform { a: 0.0, b: 20.0 };
        assert_eq!(set(&[(0.0, 20.0)]).measure_against(&uniform).unwrap(), 1.0);
        assert_eq!(IntervalSet::empty().measure_against(&uniform).unwrap(), 0.0);
        let half = set(&[(0.0, 5.0), (15.0, 20.0)]).measure_against(&uniform).unwrap();
        assert!((half - 0.5).abs() < 1e-12);
    }

    /// 长度为 0 的项生成孤立点。
    fn arb_set() -> impl Strategy<Value = IntervalSet> {
        prop::collection::vec((0u32..=200, 0u32..40), 0..6).prop_map(|raw| {
            raw.into_iter()
                .map(|(start, len)| {
                    let start = start as f64 * 0.5;
                    Interval {
                        start,
                        end: (start + len as f64 * 0.5).min(100.0),
                    }
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn normalized_sets_are_sorted_and_disjoint(a in arb_set()) {
            for pair in a.as_slice().windows(2) {
                prop_assert!(pair[0].end + MERGE_EPSILON < pair[1].start);
            }
            for iv in a.iter() {
                prop_assert!(iv.start <= iv.end);
            }
        }

        #[test]
        fn complement_is_normalized(a in arb_set()) {
            let rest = a.complement(0.0, 100.0);
            for pair in rest.as_slice().windows(2) {
                prop_assert!(pair[0].end + MERGE_EPSILON < pair[1].start);
            }
            prop_assert!(rest.iter().all(|iv| !iv.is_point()));
        }

        #[test]
        fn union_with_complement_covers(a in arb_set()) {
            prop_assert_eq!(a.union(&a.complement(0.0, 100.0)), IntervalSet::full(0.0, 100.0));
        }

        #[test]
        fn intersect_with_complement_is_empty(a in arb_set()) {
            prop_assert!(a.intersect(&a.complement(0.0, 100.0)).is_empty());
        }

        #[test]
        fn operations_commute(a in arb_set(), b in arb_set()) {
            prop_assert_eq!(a.union(&b), b.union(&a));
            prop_assert_eq!(a.intersect(&b), b.intersect(&a));
        }

        #[test]
        fn operations_associate(a in arb_set(), b in arb_set(), c in arb_set()) {
            prop_assert_eq!(a.union(&b).union(&c), a.union(&b.union(&c)));
            prop_assert_eq!(a.intersect(&b).intersect(&c), a.intersect(&b.intersect(&c)));
        }

        #[test]
        fn de_morgan(a in arb_set(), b in arb_set()) {
            prop_assert_eq!(
                a.union(&b).complement(0.0, 100.0),
                a.complement(0.0, 100.0).intersect(&b.complement(0.0, 100.0))
            );
            prop_assert_eq!(
                a.intersect(&b).complement(0.0, 100.0),
                a.complement(0.0, 100.0).union(&b.complement(0.0, 100.0))
            );
        }

        #[test]
        fn contains_agrees_with_intervals(a in arb_set(), t in 0u32..220) {
            let t = t as f64 * 0.5;
            prop_assert_eq!(a.contains(t), a.iter().any(|iv| iv.contains(t)));
        }

        #[test]
        fn complement_probabilities_sum_to_one(a in arb_set()) {
            let uniform = Distribution::Uniform { a: 0.0, b: 100.0 };
            let p = a.measure_against(&uniform).unwrap();
            let q = a.complement(0.0, 100.0).measure_against(&uniform).unwrap();
            prop_assert!((0.0..=1.0).contains(&p));
            prop_assert!((p + q - 1.0).abs() < 1e-9);
        }
    }
}
