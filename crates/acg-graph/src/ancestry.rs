//! Interval algebra over labelled site ranges.
//!
//! A [`SiteAncestry`] is a sorted list of disjoint, maximally merged
//! half-open intervals `[x, y)`, each labelled with the set of lineages whose
//! ancestral material it holds. Splitting routes material along a conversion;
//! merging joins two lineages and records where they coalesce.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use acg_core::errors::{AcgError, ErrorInfo};

/// Set of lineage labels carried by an interval.
pub type Lineages = BTreeSet<usize>;

/// One labelled half-open interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestryInterval {
    /// First site.
    pub start: usize,
    /// One past the last site.
    pub end: usize,
    /// Lineages carried on `[start, end)`.
    pub lineages: Lineages,
}

/// Sorted, disjoint, maximally merged labelled intervals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SiteAncestry {
    intervals: Vec<AncestryInterval>,
}

impl SiteAncestry {
    /// Empty ancestry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ancestry of a single lineage covering `[start, end)`.
    pub fn single(start: usize, end: usize, lineage: usize) -> Self {
        let mut ancestry = Self::new();
        if start < end {
            ancestry.intervals.push(AncestryInterval {
                start,
                end,
                lineages: Lineages::from([lineage]),
            });
        }
        ancestry
    }

    /// Appends `[start, end)` with the given labels. Empty intervals are
    /// ignored and an interval touching an equally labelled predecessor is
    /// merged into it.
    pub fn add_interval(
        &mut self,
        start: usize,
        end: usize,
        lineages: Lineages,
    ) -> Result<(), AcgError> {
        if start >= end {
            return Ok(());
        }
        if let Some(last) = self.intervals.last_mut() {
            if start < last.end {
                return Err(AcgError::Graph(
                    ErrorInfo::new("ancestry-order", "intervals must be appended in order")
                        .with_context("start", start)
                        .with_context("previous_end", last.end),
                ));
            }
            if start == last.end && lineages == last.lineages {
                last.end = end;
                return Ok(());
            }
        }
        self.intervals.push(AncestryInterval {
            start,
            end,
            lineages,
        });
        Ok(())
    }

    fn push_unchecked(&mut self, start: usize, end: usize, lineages: Lineages) {
        if start >= end {
            return;
        }
        if let Some(last) = self.intervals.last_mut() {
            if start == last.end && lineages == last.lineages {
                last.end = end;
                return;
            }
        }
        self.intervals.push(AncestryInterval {
            start,
            end,
            lineages,
        });
    }

    /// Intervals in site order.
    pub fn intervals(&self) -> &[AncestryInterval] {
        &self.intervals
    }

    /// Whether no site carries ancestral material.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of covered sites.
    pub fn site_count(&self) -> usize {
        self.intervals.iter().map(|iv| iv.end - iv.start).sum()
    }

    /// Cuts every interval against `[lo, hi)`.
    ///
    /// Returns the material inside and outside the cut. Labels are preserved
    /// and merging the two halves reproduces `self`.
    pub fn split(&self, lo: usize, hi: usize) -> (SiteAncestry, SiteAncestry) {
        let mut inside = SiteAncestry::new();
        let mut outside = SiteAncestry::new();
        for iv in &self.intervals {
            outside.push_unchecked(iv.start, iv.end.min(lo), iv.lineages.clone());
            inside.push_unchecked(iv.start.max(lo), iv.end.min(hi), iv.lineages.clone());
            outside.push_unchecked(iv.start.max(hi), iv.end, iv.lineages.clone());
        }
        (inside, outside)
    }

    /// Joins two ancestries.
    ///
    /// Sites covered by both sides get the union of labels and produce a
    /// coalescence record; elsewhere the single covering label is kept.
    pub fn merge(&self, other: &SiteAncestry) -> (Coalescence, SiteAncestry) {
        let mut points: Vec<usize> = self
            .intervals
            .iter()
            .chain(other.intervals.iter())
            .flat_map(|iv| [iv.start, iv.end])
            .collect();
        points.sort_unstable();
        points.dedup();

        let mut coalescence = Coalescence::default();
        let mut union = SiteAncestry::new();
        let (mut ia, mut ib) = (0usize, 0usize);
        for window in points.windows(2) {
            let (x, y) = (window[0], window[1]);
            while ia < self.intervals.len() && self.intervals[ia].end <= x {
                ia += 1;
            }
            while ib < other.intervals.len() && other.intervals[ib].end <= x {
                ib += 1;
            }
            let left = self.intervals.get(ia).filter(|iv| iv.start <= x);
            let right = other.intervals.get(ib).filter(|iv| iv.start <= x);
            match (left, right) {
                (Some(a), Some(b)) => {
                    coalescence.add(x, y, a.lineages.clone(), b.lineages.clone());
                    let joined = a.lineages.union(&b.lineages).copied().collect();
                    union.push_unchecked(x, y, joined);
                }
                (Some(a), None) => union.push_unchecked(x, y, a.lineages.clone()),
                (None, Some(b)) => union.push_unchecked(x, y, b.lineages.clone()),
                (None, None) => {}
            }
        }
        (coalescence, union)
    }
}

impl fmt::Display for SiteAncestry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, iv) in self.intervals.iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            write!(f, "[{},{}]{}", iv.start, iv.end, LabelSet(&iv.lineages))?;
        }
        Ok(())
    }
}

struct LabelSet<'a>(&'a Lineages);

impl fmt::Display for LabelSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, label) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{label}")?;
        }
        write!(f, "}}")
    }
}

impl FromStr for SiteAncestry {
    type Err = AcgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ancestry = SiteAncestry::new();
        for token in s.split_whitespace() {
            let parsed = parse_token(token).ok_or_else(|| {
                AcgError::Serde(
                    ErrorInfo::new("ancestry-syntax", "expected `[start,end]{labels}`")
                        .with_context("token", token),
                )
            })?;
            ancestry.add_interval(parsed.0, parsed.1, parsed.2)?;
        }
        Ok(ancestry)
    }
}

fn parse_token(token: &str) -> Option<(usize, usize, Lineages)> {
    let rest = token.strip_prefix('[')?;
    let (range, rest) = rest.split_once(']')?;
    let (start, end) = range.split_once(',')?;
    let labels = rest.strip_prefix('{')?.strip_suffix('}')?;
    let lineages = if labels.trim().is_empty() {
        Lineages::new()
    } else {
        labels
            .split(',')
            .map(|l| l.trim().parse().ok())
            .collect::<Option<Lineages>>()?
    };
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?, lineages))
}

/// Where two ancestries met, with the label sets of each side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalescenceInterval {
    /// First site.
    pub start: usize,
    /// One past the last site.
    pub end: usize,
    /// Labels of the first side.
    pub left: Lineages,
    /// Labels of the second side.
    pub right: Lineages,
}

impl CoalescenceInterval {
    fn same_pair(&self, left: &Lineages, right: &Lineages) -> bool {
        (self.left == *left && self.right == *right) || (self.left == *right && self.right == *left)
    }
}

/// Coalescence records produced by [`SiteAncestry::merge`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Coalescence {
    intervals: Vec<CoalescenceInterval>,
}

impl Coalescence {
    /// Appends a record, extending the previous one when it touches `start`
    /// and pairs the same label sets in either order.
    pub fn add(&mut self, start: usize, end: usize, left: Lineages, right: Lineages) {
        if start >= end {
            return;
        }
        if let Some(last) = self.intervals.last_mut() {
            if last.end == start && last.same_pair(&left, &right) {
                last.end = end;
                return;
            }
        }
        self.intervals.push(CoalescenceInterval {
            start,
            end,
            left,
            right,
        });
    }

    /// Records in site order.
    pub fn intervals(&self) -> &[CoalescenceInterval] {
        &self.intervals
    }

    /// Whether nothing coalesced.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of sites at which a coalescence happened.
    pub fn site_count(&self) -> usize {
        self.intervals.iter().map(|iv| iv.end - iv.start).sum()
    }
}

impl fmt::Display for Coalescence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, iv) in self.intervals.iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            write!(
                f,
                "[{},{}]{}{}",
                iv.start,
                iv.end,
                LabelSet(&iv.left),
                LabelSet(&iv.right)
            )?;
        }
        Ok(())
    }
}
