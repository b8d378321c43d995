use std::collections::BTreeMap;

use crate::ancestry::{Coalescence, SiteAncestry};
use crate::cf_events::CfEventKind;
use crate::graph::ConversionGraph;
use crate::ids::{ConversionId, NodeId};

/// Ancestral material routed through the graph for one locus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AncestralSiteWalk {
    /// Sites each conversion actually carries, labelled by descendant leaves.
    pub carried: BTreeMap<ConversionId, SiteAncestry>,
    /// Coalescences in height order.
    pub coalescences: Vec<(f64, Coalescence)>,
    /// Material that reaches the root lineage.
    pub root: SiteAncestry,
}

impl AncestralSiteWalk {
    /// Whether a conversion carries no ancestral site.
    pub fn is_invisible(&self, id: ConversionId) -> bool {
        self.carried.get(&id).map_or(true, SiteAncestry::is_empty)
    }
}

struct Transfer {
    height: f64,
    departure: bool,
    id: ConversionId,
    node1: NodeId,
    node2: NodeId,
    start: usize,
    end: usize,
}

/// Follows every leaf's sites of `locus` backwards in time, splitting
/// material off at conversion departures and merging it at arrivals and
/// clonal frame coalescences.
pub fn ancestral_site_walk(acg: &ConversionGraph, locus: usize) -> AncestralSiteWalk {
    let mut walk = AncestralSiteWalk::default();
    let Some(locus_def) = acg.locus(locus) else {
        return walk;
    };
    let frame = acg.frame();

    let mut transfers: Vec<Transfer> = acg
        .conversions(locus)
        .iter()
        .flat_map(|c| {
            [true, false].map(|departure| Transfer {
                height: if departure { c.height1 } else { c.height2 },
                departure,
                id: c.id(),
                node1: c.node1,
                node2: c.node2,
                start: c.start(),
                end: c.end() + 1,
            })
        })
        .collect();
    transfers.sort_by(|a, b| a.height.total_cmp(&b.height));

    let mut lineages: BTreeMap<NodeId, SiteAncestry> = BTreeMap::new();
    let mut in_flight: BTreeMap<ConversionId, SiteAncestry> = BTreeMap::new();
    let events = acg.cf_events().events();
    let mut next = 0usize;

    for (idx, event) in events.iter().enumerate() {
        match event.kind {
            CfEventKind::Sample => {
                lineages.insert(
                    event.node,
                    SiteAncestry::single(0, locus_def.site_count(), event.node.index()),
                );
            }
            CfEventKind::Coalescence => {
                let mut merged = SiteAncestry::new();
                for child in frame.children(event.node) {
                    if let Some(material) = lineages.remove(child) {
                        let (coalescence, union) = merged.merge(&material);
                        if !coalescence.is_empty() {
                            walk.coalescences.push((event.height, coalescence));
                        }
                        merged = union;
                    }
                }
                lineages.insert(event.node, merged);
            }
        }

        let upper = events.get(idx + 1).map(|e| e.height);
        while next < transfers.len() && upper.map_or(true, |h| transfers[next].height < h) {
            let transfer = &transfers[next];
            next += 1;
            if transfer.departure {
                let material = lineages.remove(&transfer.node1).unwrap_or_default();
                let (inside, outside) = material.split(transfer.start, transfer.end);
                lineages.insert(transfer.node1, outside);
                walk.carried.insert(transfer.id, inside.clone());
                in_flight.insert(transfer.id, inside);
                continue;
            }
            let carried = in_flight.remove(&transfer.id).unwrap_or_default();
            let resident = lineages.remove(&transfer.node2).unwrap_or_default();
            let (coalescence, union) = resident.merge(&carried);
            if !coalescence.is_empty() {
                walk.coalescences.push((transfer.height, coalescence));
            }
            lineages.insert(transfer.node2, union);
        }
    }

    walk.root = lineages.remove(&frame.root()).unwrap_or_default();
    walk
}
