use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::ConversionGraph;
use crate::ids::ConversionId;

/// Maximal half-open site range `[start, end)` over which the set of active
/// conversions is constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// First site.
    pub start: usize,
    /// One past the last site.
    pub end: usize,
    /// Conversions covering every site of the region.
    pub active: BTreeSet<ConversionId>,
}

impl Region {
    /// Whether the region follows the clonal frame alone.
    pub fn is_clonal_frame(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of sites.
    pub fn site_count(&self) -> usize {
        self.end - self.start
    }
}

/// Partitions a locus into regions of constant conversion activity.
///
/// Returns an empty list for an unknown locus.
pub fn region_list(acg: &ConversionGraph, locus: usize) -> Vec<Region> {
    let Some(locus_def) = acg.locus(locus) else {
        return Vec::new();
    };
    let mut events: Vec<(usize, bool, ConversionId)> = Vec::new();
    for conv in acg.conversions(locus) {
        events.push((conv.start(), true, conv.id()));
        events.push((conv.end() + 1, false, conv.id()));
    }
    events.sort_by_key(|(site, _, _)| *site);

    let mut regions = Vec::new();
    let mut active = BTreeSet::new();
    let mut cursor = 0usize;
    let mut idx = 0usize;
    while idx < events.len() {
        let site = events[idx].0;
        if site > cursor {
            push_region(&mut regions, cursor, site, &active);
            cursor = site;
        }
        while idx < events.len() && events[idx].0 == site {
            let (_, starts, id) = events[idx];
            if starts {
                active.insert(id);
            } else {
                active.remove(&id);
            }
            idx += 1;
        }
    }
    if cursor < locus_def.site_count() {
        push_region(&mut regions, cursor, locus_def.site_count(), &active);
    }
    regions
}

fn push_region(regions: &mut Vec<Region>, start: usize, end: usize, active: &BTreeSet<ConversionId>) {
    if let Some(last) = regions.last_mut() {
        if last.end == start && last.active == *active {
            last.end = end;
            return;
        }
    }
    regions.push(Region {
        start,
        end,
        active: active.clone(),
    });
}
